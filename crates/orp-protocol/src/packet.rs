//! Packet kinds and the table that drives encoding and validation.

use std::fmt;

/// Set of packet fields, used for the per-type mandatory field mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldMask(u16);

impl FieldMask {
    pub const NONE: Self = Self(0);
    pub const DATA_TYPE: Self = Self(0x0001);
    pub const STATUS: Self = Self(0x0002);
    pub const VERSION: Self = Self(0x0004);
    pub const EVENT: Self = Self(0x0008);
    pub const TIME: Self = Self(0x0010);
    pub const PATH: Self = Self(0x0020);
    pub const UNITS: Self = Self(0x0040);
    pub const DATA: Self = Self(0x0080);
    pub const SENT: Self = Self(0x0100);
    pub const RECEIVED: Self = Self(0x0200);
    pub const MTU: Self = Self(0x0400);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl std::ops::BitOr for FieldMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Which value the second header byte carries for a packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderByte {
    Status,
    DataType,
    Version,
    Event,
    /// No meaning; sent as the undefined data type pad.
    Pad,
}

/// Every packet kind of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    InputCreateRequest,
    InputCreateResponse,
    OutputCreateRequest,
    OutputCreateResponse,
    DeleteRequest,
    DeleteResponse,
    HandlerAddRequest,
    HandlerAddResponse,
    HandlerRemoveRequest,
    HandlerRemoveResponse,
    PushRequest,
    PushResponse,
    GetRequest,
    GetResponse,
    ExampleSetRequest,
    ExampleSetResponse,
    SensorCreateRequest,
    SensorCreateResponse,
    SensorRemoveRequest,
    SensorRemoveResponse,
    HandlerCallNotify,
    HandlerCallResponse,
    SensorCallNotify,
    SensorCallResponse,
    SyncSyn,
    SyncSynAck,
    SyncAck,
    FileDataRequest,
    FileDataResponse,
    FileControlNotify,
    FileControlResponse,
    UnknownRequestResponse,
}

/// One row of the packet table.
#[derive(Debug, Clone, Copy)]
pub struct PacketInfo {
    pub packet_type: PacketType,
    pub wire: u8,
    pub name: &'static str,
    pub required: FieldMask,
}

const fn row(packet_type: PacketType, wire: u8, name: &'static str, required: FieldMask) -> PacketInfo {
    PacketInfo {
        packet_type,
        wire,
        name,
        required,
    }
}

const TYPED_PATH: FieldMask = FieldMask::DATA_TYPE.union(FieldMask::PATH);
const TIMED_PATH: FieldMask = FieldMask::TIME.union(FieldMask::PATH);

/// The packet table, indexed by `PacketType as usize`.
pub static PACKET_TABLE: [PacketInfo; 32] = {
    use FieldMask as F;
    use PacketType as T;
    [
        row(T::InputCreateRequest, b'I', "input-create", TYPED_PATH),
        row(T::InputCreateResponse, b'i', "input-create-resp", F::STATUS),
        row(T::OutputCreateRequest, b'O', "output-create", TYPED_PATH),
        row(T::OutputCreateResponse, b'o', "output-create-resp", F::STATUS),
        row(T::DeleteRequest, b'D', "delete", F::PATH),
        row(T::DeleteResponse, b'd', "delete-resp", F::STATUS),
        row(T::HandlerAddRequest, b'H', "handler-add", F::PATH),
        row(T::HandlerAddResponse, b'h', "handler-add-resp", F::STATUS),
        row(T::HandlerRemoveRequest, b'K', "handler-remove", F::PATH),
        row(T::HandlerRemoveResponse, b'k', "handler-remove-resp", F::STATUS),
        row(T::PushRequest, b'P', "push", TYPED_PATH),
        row(T::PushResponse, b'p', "push-resp", F::STATUS),
        row(T::GetRequest, b'G', "get", F::PATH),
        row(T::GetResponse, b'g', "get-resp", F::STATUS),
        row(T::ExampleSetRequest, b'E', "example-set", TYPED_PATH),
        row(T::ExampleSetResponse, b'e', "example-set-resp", F::STATUS),
        row(T::SensorCreateRequest, b'S', "sensor-create", TYPED_PATH),
        row(T::SensorCreateResponse, b's', "sensor-create-resp", F::STATUS),
        row(T::SensorRemoveRequest, b'R', "sensor-remove", F::PATH),
        row(T::SensorRemoveResponse, b'r', "sensor-remove-resp", F::STATUS),
        row(T::HandlerCallNotify, b'c', "handler-call", TIMED_PATH),
        row(T::HandlerCallResponse, b'C', "handler-call-resp", F::STATUS),
        row(T::SensorCallNotify, b'b', "sensor-call", F::PATH),
        row(T::SensorCallResponse, b'B', "sensor-call-resp", F::STATUS),
        row(T::SyncSyn, b'Y', "sync-syn", F::VERSION),
        row(T::SyncSynAck, b'y', "sync-synack", F::VERSION),
        row(T::SyncAck, b'z', "sync-ack", F::VERSION),
        row(T::FileDataRequest, b'F', "file-data", F::DATA),
        row(T::FileDataResponse, b'f', "file-data-resp", F::STATUS),
        row(T::FileControlNotify, b'L', "file-control", F::EVENT),
        row(T::FileControlResponse, b'l', "file-control-resp", F::STATUS),
        row(T::UnknownRequestResponse, b'?', "unknown-request-resp", F::STATUS),
    ]
};

impl PacketType {
    /// Table row for this packet type.
    pub fn info(self) -> &'static PacketInfo {
        &PACKET_TABLE[self as usize]
    }

    /// Look up a packet type by its wire byte.
    pub fn from_wire(byte: u8) -> Option<Self> {
        PACKET_TABLE
            .iter()
            .find(|info| info.wire == byte)
            .map(|info| info.packet_type)
    }

    /// Look up a packet type by its table name (e.g. `push`, `get-resp`).
    pub fn from_name(name: &str) -> Option<Self> {
        PACKET_TABLE
            .iter()
            .find(|info| info.name.eq_ignore_ascii_case(name))
            .map(|info| info.packet_type)
    }

    pub fn wire(self) -> u8 {
        self.info().wire
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Fields a packet of this type must carry.
    pub fn required(self) -> FieldMask {
        self.info().required
    }

    /// Meaning of header byte 1, by priority status, data type, version, event.
    pub fn header_byte(self) -> HeaderByte {
        let required = self.required();
        if required.contains(FieldMask::STATUS) {
            HeaderByte::Status
        } else if required.contains(FieldMask::DATA_TYPE) {
            HeaderByte::DataType
        } else if required.contains(FieldMask::VERSION) {
            HeaderByte::Version
        } else if required.contains(FieldMask::EVENT) {
            HeaderByte::Event
        } else {
            HeaderByte::Pad
        }
    }

    pub fn is_response(self) -> bool {
        self.required().contains(FieldMask::STATUS)
    }

    pub fn is_sync(self) -> bool {
        matches!(self, Self::SyncSyn | Self::SyncSynAck | Self::SyncAck)
    }

    /// Whether a units field is emitted for this type.
    pub fn carries_units(self) -> bool {
        matches!(
            self,
            Self::InputCreateRequest
                | Self::OutputCreateRequest
                | Self::SensorCreateRequest
                | Self::ExampleSetRequest
        )
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), char::from(self.wire()))
    }
}

/// Resource data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Trigger,
    Boolean,
    Numeric,
    String,
    Json,
}

/// Wire byte for an unspecified data type; also the byte 1 pad.
pub const DATA_TYPE_UNDEFINED: u8 = b' ';

impl DataType {
    pub const ALL: [Self; 5] = [
        Self::Trigger,
        Self::Boolean,
        Self::Numeric,
        Self::String,
        Self::Json,
    ];

    pub fn wire(self) -> u8 {
        match self {
            Self::Trigger => b'T',
            Self::Boolean => b'B',
            Self::Numeric => b'N',
            Self::String => b'S',
            Self::Json => b'J',
        }
    }

    pub fn from_wire(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|dt| dt.wire() == byte)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Boolean => "boolean",
            Self::Numeric => "numeric",
            Self::String => "string",
            Self::Json => "json",
        }
    }
}

/// File-transfer control events, carried in byte 1 of file control packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileEvent {
    Info = 0,
    Ready = 1,
    Pending = 2,
    Start = 3,
    Suspend = 4,
    Resume = 5,
    Complete = 6,
    Abort = 7,
}

impl FileEvent {
    pub const ALL: [Self; 8] = [
        Self::Info,
        Self::Ready,
        Self::Pending,
        Self::Start,
        Self::Suspend,
        Self::Resume,
        Self::Complete,
        Self::Abort,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Ready => "ready",
            Self::Pending => "pending",
            Self::Start => "start",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Abort => "abort",
        }
    }
}

/// Encode a small code (version or event) as `0-9` then `A-Z`.
pub fn code_to_wire(code: u8) -> Option<u8> {
    match code {
        0..=9 => Some(b'0' + code),
        10..=35 => Some(b'A' + (code - 10)),
        _ => None,
    }
}

/// Inverse of [`code_to_wire`].
pub fn code_from_wire(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'Z' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_discriminant() {
        for (index, info) in PACKET_TABLE.iter().enumerate() {
            assert_eq!(info.packet_type as usize, index, "{}", info.name);
        }
    }

    #[test]
    fn wire_bytes_and_names_are_unique() {
        for (i, a) in PACKET_TABLE.iter().enumerate() {
            for b in &PACKET_TABLE[i + 1..] {
                assert_ne!(a.wire, b.wire, "{} / {}", a.name, b.name);
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn wire_lookup_is_symmetric() {
        for info in &PACKET_TABLE {
            assert_eq!(PacketType::from_wire(info.wire), Some(info.packet_type));
            assert_eq!(PacketType::from_name(info.name), Some(info.packet_type));
        }
        assert_eq!(PacketType::from_wire(b'x'), None);
        assert_eq!(PacketType::from_wire(b','), None);
    }

    #[test]
    fn header_byte_follows_the_table() {
        assert_eq!(PacketType::PushRequest.header_byte(), HeaderByte::DataType);
        assert_eq!(PacketType::PushResponse.header_byte(), HeaderByte::Status);
        assert_eq!(PacketType::SyncSyn.header_byte(), HeaderByte::Version);
        assert_eq!(PacketType::FileControlNotify.header_byte(), HeaderByte::Event);
        assert_eq!(PacketType::DeleteRequest.header_byte(), HeaderByte::Pad);
        assert_eq!(PacketType::HandlerCallNotify.header_byte(), HeaderByte::Pad);
        assert_eq!(PacketType::FileDataRequest.header_byte(), HeaderByte::Pad);
        assert_eq!(
            PacketType::UnknownRequestResponse.header_byte(),
            HeaderByte::Status
        );
    }

    #[test]
    fn response_names_end_in_resp() {
        for info in PACKET_TABLE.iter().filter(|i| i.packet_type.is_response()) {
            assert!(info.name.ends_with("-resp"), "{}", info.name);
        }
    }

    #[test]
    fn data_type_codes() {
        for dt in DataType::ALL {
            assert_eq!(DataType::from_wire(dt.wire()), Some(dt));
        }
        assert_eq!(DataType::from_wire(DATA_TYPE_UNDEFINED), None);
    }

    #[test]
    fn small_code_encoding() {
        assert_eq!(code_to_wire(0), Some(b'0'));
        assert_eq!(code_to_wire(9), Some(b'9'));
        assert_eq!(code_to_wire(10), Some(b'A'));
        assert_eq!(code_to_wire(35), Some(b'Z'));
        assert_eq!(code_to_wire(36), None);
        for code in 0..36 {
            assert_eq!(code_from_wire(code_to_wire(code).unwrap()), Some(code));
        }
        assert_eq!(code_from_wire(b'a'), None);
    }

    #[test]
    fn file_events() {
        for event in FileEvent::ALL {
            assert_eq!(FileEvent::from_code(event.code()), Some(event));
        }
        assert_eq!(FileEvent::from_code(8), None);
        assert_eq!(FileEvent::Complete.code(), 6);
        assert_eq!(FileEvent::Abort.code(), 7);
    }
}
