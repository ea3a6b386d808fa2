//! Octave Resource Protocol packet codec.
//!
//! A packet is a 4-byte header (type, a byte whose meaning depends on the
//! type, little-endian sequence number) followed by comma-separated fields,
//! each introduced by a one-letter identifier. One static table maps every
//! [`PacketType`] to its wire byte and mandatory fields; encoding, header
//! byte meaning and decode validation all read from it.

pub mod codec;
pub mod error;
pub mod message;
pub mod packet;
pub mod status;

pub use codec::{
    parse_timestamp, CodecConfig, PacketCodec, ProtocolVersion, TimestampLimits, HEADER_LEN,
    MAX_DATA_LEN, MAX_PACKET_LEN, MAX_PATH_LEN, MAX_TIMESTAMP_LEN, MAX_UNITS_LEN,
    PACKET_OVERHEAD, SEPARATOR,
};
pub use error::{CodecError, Field, Result};
pub use message::Message;
pub use packet::{DataType, FieldMask, FileEvent, HeaderByte, PacketInfo, PacketType, PACKET_TABLE};
