//! Table-driven CRC-16/CCITT-FALSE.
//!
//! Polynomial 0x1021, initial value 0xFFFF, MSB-first, no reflection and no
//! final XOR. The peer computes the same running value, so the table must stay
//! bit-exact.

/// Generator polynomial.
pub const POLY: u16 = 0x1021;

/// Accumulator value before the first byte.
pub const INIT: u16 = 0xFFFF;

static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc: u16 = 0;
        let mut c: u16 = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            if (crc ^ c) & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
            c <<= 1;
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Start a new running CRC.
#[inline]
pub const fn init() -> u16 {
    INIT
}

/// Fold one byte into the running CRC.
#[inline]
pub fn update(crc: u16, byte: u8) -> u16 {
    (crc << 8) ^ TABLE[usize::from((crc >> 8) as u8 ^ byte)]
}

/// CRC of a complete buffer.
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(init(), |crc, &byte| update(crc, byte))
}
