use crate::packet::PacketType;

/// Names a variable-length field in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    DataType,
    Status,
    Version,
    Event,
    Timestamp,
    Path,
    Units,
    Data,
    SentCount,
    ReceivedCount,
    Mtu,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Field::DataType => "data type",
            Field::Status => "status",
            Field::Version => "version",
            Field::Event => "event",
            Field::Timestamp => "timestamp",
            Field::Path => "path",
            Field::Units => "units",
            Field::Data => "data",
            Field::SentCount => "sent count",
            Field::ReceivedCount => "received count",
            Field::Mtu => "MTU",
        };
        f.write_str(name)
    }
}

/// Errors from packet encoding and decoding.
///
/// Malformed packets from a serial link are expected, so every rejection
/// carries enough detail to log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("packet too short ({len} bytes, min {min})")]
    PacketTooShort { len: usize, min: usize },

    #[error("unknown packet type byte {byte:#04x}")]
    UnknownPacketType { byte: u8 },

    #[error("invalid {field} byte {byte:#04x} for {packet_type}")]
    InvalidHeaderByte {
        packet_type: PacketType,
        field: Field,
        byte: u8,
    },

    #[error("unknown field identifier {byte:#04x} at offset {offset}")]
    UnknownField { byte: u8, offset: usize },

    #[error("duplicate {field} field")]
    DuplicateField { field: Field },

    #[error("{field} field not allowed for {packet_type}")]
    UnexpectedField {
        packet_type: PacketType,
        field: Field,
    },

    #[error("{packet_type} requires a {field} field")]
    MissingField {
        packet_type: PacketType,
        field: Field,
    },

    #[error("malformed timestamp {text:?}: {reason}")]
    InvalidTimestamp { text: String, reason: &'static str },

    #[error("malformed {field} {text:?}")]
    InvalidCount { field: Field, text: String },

    #[error("{field} is {len} bytes, max {max}")]
    FieldTooLong { field: Field, len: usize, max: usize },

    #[error("{field} contains the field separator")]
    SeparatorInField { field: Field },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: Field },

    #[error("{field} value {value} cannot be encoded")]
    ValueOutOfRange { field: Field, value: i64 },

    #[error("buffer too small ({available} bytes available, {needed} needed)")]
    BufferTooSmall { needed: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
