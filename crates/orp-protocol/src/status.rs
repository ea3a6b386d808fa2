//! Response status codes.
//!
//! Statuses are small non-positive integers sent as a single printable byte,
//! `'@' - status`, so OK is `'@'` and NOT_FOUND is `'A'`.

pub const OK: i32 = 0;
pub const NOT_FOUND: i32 = -1;
pub const NOT_POSSIBLE: i32 = -2;
pub const OUT_OF_RANGE: i32 = -3;
pub const NO_MEMORY: i32 = -4;
pub const NOT_PERMITTED: i32 = -5;
pub const FAULT: i32 = -6;
pub const COMM_ERROR: i32 = -7;
pub const TIMEOUT: i32 = -8;
pub const OVERFLOW: i32 = -9;
pub const UNDERFLOW: i32 = -10;
pub const WOULD_BLOCK: i32 = -11;
pub const DEADLOCK: i32 = -12;
pub const FORMAT_ERROR: i32 = -13;
pub const DUPLICATE: i32 = -14;
pub const BAD_PARAMETER: i32 = -15;
pub const CLOSED: i32 = -16;
pub const BUSY: i32 = -17;
pub const UNSUPPORTED: i32 = -18;
pub const IO_ERROR: i32 = -19;
pub const NOT_IMPLEMENTED: i32 = -20;
pub const UNAVAILABLE: i32 = -21;
pub const TERMINATED: i32 = -22;
pub const IN_PROGRESS: i32 = -23;
pub const SUSPENDED: i32 = -24;

const BASE: u8 = b'@';
const LAST: u8 = b'~';

/// Wire byte for `status`; `None` outside `0..=-62`.
pub fn to_wire(status: i32) -> Option<u8> {
    let offset = u8::try_from(-i64::from(status)).ok()?;
    if offset > LAST - BASE {
        return None;
    }
    Some(BASE + offset)
}

/// Status carried by a wire byte; `None` outside `'@'..='~'`.
pub fn from_wire(byte: u8) -> Option<i32> {
    if (BASE..=LAST).contains(&byte) {
        Some(-i32::from(byte - BASE))
    } else {
        None
    }
}

/// Symbolic name of a status, when it has one.
pub fn name(status: i32) -> Option<&'static str> {
    const NAMES: [&str; 25] = [
        "OK",
        "NOT_FOUND",
        "NOT_POSSIBLE",
        "OUT_OF_RANGE",
        "NO_MEMORY",
        "NOT_PERMITTED",
        "FAULT",
        "COMM_ERROR",
        "TIMEOUT",
        "OVERFLOW",
        "UNDERFLOW",
        "WOULD_BLOCK",
        "DEADLOCK",
        "FORMAT_ERROR",
        "DUPLICATE",
        "BAD_PARAMETER",
        "CLOSED",
        "BUSY",
        "UNSUPPORTED",
        "IO_ERROR",
        "NOT_IMPLEMENTED",
        "UNAVAILABLE",
        "TERMINATED",
        "IN_PROGRESS",
        "SUSPENDED",
    ];
    let index = usize::try_from(-i64::from(status)).ok()?;
    NAMES.get(index).copied()
}
