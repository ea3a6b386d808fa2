use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{CodecError, Field, Result};
use crate::message::Message;
use crate::packet::{
    code_from_wire, code_to_wire, DataType, FieldMask, FileEvent, HeaderByte, PacketType,
    DATA_TYPE_UNDEFINED,
};
use crate::status;

/// Fixed header: type, byte 1, two sequence bytes.
pub const HEADER_LEN: usize = 4;

/// Separator between variable-length fields.
pub const SEPARATOR: u8 = b',';

pub const MAX_PATH_LEN: usize = 79;
pub const MAX_UNITS_LEN: usize = 23;
pub const MAX_DATA_LEN: usize = 50_000;
/// `0000000000.000000`
pub const MAX_TIMESTAMP_LEN: usize = 17;
/// Header plus the identifiers of `T`, `P`, `U` and `D` and the three
/// separators between them.
pub const PACKET_OVERHEAD: usize = HEADER_LEN + 4 + 3;
/// Largest packet the default limits allow.
pub const MAX_PACKET_LEN: usize =
    PACKET_OVERHEAD + MAX_TIMESTAMP_LEN + MAX_PATH_LEN + MAX_UNITS_LEN + MAX_DATA_LEN;

const FIELD_TIME: u8 = b'T';
const FIELD_PATH: u8 = b'P';
const FIELD_UNITS: u8 = b'U';
const FIELD_DATA: u8 = b'D';
const FIELD_MTU: u8 = b'M';
const FIELD_SENT: u8 = b'S';
const FIELD_RECEIVED: u8 = b'R';

/// Protocol revision negotiated with the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Number sent in the version byte of sync packets.
    pub fn number(self) -> u8 {
        match self {
            Self::V1 => 0,
            Self::V2 => 1,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            0 => Some(Self::V1),
            1 => Some(Self::V2),
            _ => None,
        }
    }
}

/// Width limits for timestamp text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampLimits {
    /// Digits before the decimal point. Default: 10.
    pub max_integer_digits: usize,
    /// Digits after the decimal point. Default: 6.
    pub max_fraction_digits: usize,
}

impl Default for TimestampLimits {
    fn default() -> Self {
        Self {
            max_integer_digits: 10,
            max_fraction_digits: 6,
        }
    }
}

/// Codec configuration.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub timestamp: TimestampLimits,
    /// Send timestamps as whole seconds. Some module firmware rejects a
    /// decimal point in the timestamp field. Default: false.
    pub whole_second_timestamps: bool,
    /// Default: 79.
    pub max_path_len: usize,
    /// Default: 23.
    pub max_units_len: usize,
    /// Default: 50 000.
    pub max_data_len: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            timestamp: TimestampLimits::default(),
            whole_second_timestamps: false,
            max_path_len: MAX_PATH_LEN,
            max_units_len: MAX_UNITS_LEN,
            max_data_len: MAX_DATA_LEN,
        }
    }
}

/// Encodes messages to packets and decodes packets to messages.
///
/// Packet layout:
/// ```text
/// ┌──────┬────────┬─────────┬───────────────────────────────────────────┐
/// │ type │ byte 1 │ seq LE  │ T<time>,P<path>,U<units>,D<data...>       │
/// │ 1B   │ 1B     │ 2B      │ M<mtu>,S<sent>,R<received> (sync only)    │
/// └──────┴────────┴─────────┴───────────────────────────────────────────┘
/// ```
/// Data may contain the separator, so a `D` field runs to the end of the packet.
#[derive(Debug, Clone, Default)]
pub struct PacketCodec {
    version: ProtocolVersion,
    config: CodecConfig,
}

impl PacketCodec {
    pub fn new(version: ProtocolVersion) -> Self {
        Self::with_config(version, CodecConfig::default())
    }

    pub fn with_config(version: ProtocolVersion, config: CodecConfig) -> Self {
        Self { version, config }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode `msg` into `dst`, returning the packet length.
    ///
    /// Fails with `BufferTooSmall` at the first field that does not fit; the
    /// bytes of `dst` are then unspecified.
    pub fn encode(&self, msg: &Message, dst: &mut [u8]) -> Result<usize> {
        let available = dst.len();
        let mut out = &mut dst[..];
        self.write_packet(msg, &mut out)?;
        Ok(available - out.len())
    }

    /// Encode `msg` into a new buffer.
    pub fn encode_to_bytes(&self, msg: &Message) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(HEADER_LEN + 64);
        self.encode_into(msg, &mut out)?;
        Ok(out.freeze())
    }

    /// Append the packet for `msg` to `out`. On error `out` is left unchanged.
    pub fn encode_into(&self, msg: &Message, out: &mut BytesMut) -> Result<()> {
        let start = out.len();
        let result = self.write_packet(msg, out);
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    fn write_packet<B: BufMut>(&self, msg: &Message, out: &mut B) -> Result<()> {
        let packet_type = msg.packet_type;
        let required = packet_type.required();

        let byte1 = self.encode_header_byte(msg)?;
        let available = out.remaining_mut();
        let mut fields = FieldWriter {
            out,
            available,
            written: 0,
            first: true,
        };
        fields.reserve(HEADER_LEN)?;
        fields.out.put_u8(packet_type.wire());
        fields.out.put_u8(byte1);
        fields.out.put_u16_le(msg.sequence);

        match msg.timestamp {
            Some(ts) => {
                let text = self.format_timestamp(ts)?;
                fields.field(FIELD_TIME, text.as_bytes())?;
            }
            None if required.contains(FieldMask::TIME) => {
                return Err(missing(packet_type, Field::Timestamp));
            }
            None => {}
        }

        match &msg.path {
            Some(path) => {
                check_text(Field::Path, path, self.config.max_path_len)?;
                fields.field(FIELD_PATH, path.as_bytes())?;
            }
            None if required.contains(FieldMask::PATH) => {
                return Err(missing(packet_type, Field::Path));
            }
            None => {}
        }

        if let (true, Some(units)) = (packet_type.carries_units(), &msg.units) {
            check_text(Field::Units, units, self.config.max_units_len)?;
            fields.field(FIELD_UNITS, units.as_bytes())?;
        }

        match &msg.data {
            Some(_) if packet_type.is_sync() => {
                return Err(CodecError::UnexpectedField {
                    packet_type,
                    field: Field::Data,
                });
            }
            Some(data) => {
                if data.len() > self.config.max_data_len {
                    return Err(CodecError::FieldTooLong {
                        field: Field::Data,
                        len: data.len(),
                        max: self.config.max_data_len,
                    });
                }
                fields.field(FIELD_DATA, data)?;
            }
            None if required.contains(FieldMask::DATA) => {
                return Err(missing(packet_type, Field::Data));
            }
            None => {}
        }

        if packet_type.is_sync() {
            for (id, value) in [
                (FIELD_MTU, msg.mtu),
                (FIELD_SENT, msg.sent_count),
                (FIELD_RECEIVED, msg.received_count),
            ] {
                if let Some(value) = value {
                    fields.field(id, value.to_string().as_bytes())?;
                }
            }
        }

        trace!(packet_type = %packet_type, len = fields.written, "packet encoded");
        Ok(())
    }

    fn encode_header_byte(&self, msg: &Message) -> Result<u8> {
        let packet_type = msg.packet_type;
        match packet_type.header_byte() {
            HeaderByte::Status => {
                let value = msg.status.ok_or(missing(packet_type, Field::Status))?;
                status::to_wire(value).ok_or(CodecError::ValueOutOfRange {
                    field: Field::Status,
                    value: i64::from(value),
                })
            }
            HeaderByte::DataType => msg
                .data_type
                .map(DataType::wire)
                .ok_or(missing(packet_type, Field::DataType)),
            HeaderByte::Version => {
                let value = msg.version.ok_or(missing(packet_type, Field::Version))?;
                code_to_wire(value).ok_or(CodecError::ValueOutOfRange {
                    field: Field::Version,
                    value: i64::from(value),
                })
            }
            HeaderByte::Event => msg
                .event
                .and_then(|event| code_to_wire(event.code()))
                .ok_or(missing(packet_type, Field::Event)),
            HeaderByte::Pad => Ok(DATA_TYPE_UNDEFINED),
        }
    }

    fn format_timestamp(&self, ts: f64) -> Result<String> {
        if !ts.is_finite() || ts < 0.0 {
            return Err(CodecError::InvalidTimestamp {
                text: ts.to_string(),
                reason: "must be a non-negative number",
            });
        }

        let limits = self.config.timestamp;
        let text = if self.config.whole_second_timestamps {
            format!("{:.0}", ts.trunc())
        } else {
            let text = format!("{:.*}", limits.max_fraction_digits, ts);
            match text.find('.') {
                Some(_) => text.trim_end_matches('0').trim_end_matches('.').to_string(),
                None => text,
            }
        };

        let integer_digits = text.find('.').unwrap_or(text.len());
        if integer_digits > limits.max_integer_digits {
            return Err(CodecError::InvalidTimestamp {
                text,
                reason: "too many integer digits",
            });
        }
        Ok(text)
    }

    /// Decode one packet.
    pub fn decode(&self, packet: &[u8]) -> Result<Message> {
        if packet.len() < HEADER_LEN {
            return Err(CodecError::PacketTooShort {
                len: packet.len(),
                min: HEADER_LEN,
            });
        }

        let packet_type =
            PacketType::from_wire(packet[0]).ok_or(CodecError::UnknownPacketType { byte: packet[0] })?;
        let mut msg = Message::new(packet_type);
        decode_header_byte(&mut msg, packet[1])?;
        msg.sequence = u16::from_le_bytes([packet[2], packet[3]]);

        let mut offset = HEADER_LEN;
        while offset < packet.len() {
            let rest = &packet[offset..];
            let id = rest[0];

            if id == FIELD_DATA {
                let data = &rest[1..];
                if data.len() > self.config.max_data_len {
                    return Err(CodecError::FieldTooLong {
                        field: Field::Data,
                        len: data.len(),
                        max: self.config.max_data_len,
                    });
                }
                msg.data = Some(Bytes::copy_from_slice(data));
                break;
            }

            let end = rest
                .iter()
                .position(|&b| b == SEPARATOR)
                .unwrap_or(rest.len());
            let next = offset + end + 1;
            if end == 0 {
                // Empty field between separators.
                offset = next;
                continue;
            }
            let value = &rest[1..end];

            match id {
                FIELD_TIME => {
                    let ts = parse_timestamp(value, self.config.timestamp)?;
                    set_once(&mut msg.timestamp, Field::Timestamp, ts)?;
                }
                FIELD_PATH => {
                    let path = decode_text(Field::Path, value, self.config.max_path_len)?;
                    set_once(&mut msg.path, Field::Path, path)?;
                }
                FIELD_UNITS => {
                    let units = decode_text(Field::Units, value, self.config.max_units_len)?;
                    set_once(&mut msg.units, Field::Units, units)?;
                }
                FIELD_MTU | FIELD_SENT | FIELD_RECEIVED => {
                    let (slot, field) = match id {
                        FIELD_MTU => (&mut msg.mtu, Field::Mtu),
                        FIELD_SENT => (&mut msg.sent_count, Field::SentCount),
                        _ => (&mut msg.received_count, Field::ReceivedCount),
                    };
                    if !packet_type.is_sync() {
                        return Err(CodecError::UnexpectedField { packet_type, field });
                    }
                    let count = parse_count(field, value)?;
                    set_once(slot, field, count)?;
                }
                byte => return Err(CodecError::UnknownField { byte, offset }),
            }

            offset = next;
        }

        let required = packet_type.required();
        for (mask, present, field) in [
            (FieldMask::TIME, msg.timestamp.is_some(), Field::Timestamp),
            (FieldMask::PATH, msg.path.is_some(), Field::Path),
            (FieldMask::DATA, msg.data.is_some(), Field::Data),
        ] {
            if required.contains(mask) && !present {
                return Err(missing(packet_type, field));
            }
        }

        trace!(packet_type = %packet_type, sequence = msg.sequence, "packet decoded");
        Ok(msg)
    }
}

struct FieldWriter<'a, B> {
    out: &'a mut B,
    available: usize,
    written: usize,
    first: bool,
}

impl<B: BufMut> FieldWriter<'_, B> {
    fn reserve(&mut self, len: usize) -> Result<()> {
        let needed = self.written + len;
        if len > self.out.remaining_mut() {
            return Err(CodecError::BufferTooSmall {
                needed,
                available: self.available,
            });
        }
        self.written = needed;
        Ok(())
    }

    fn field(&mut self, id: u8, value: &[u8]) -> Result<()> {
        let separator = !self.first;
        self.reserve(usize::from(separator) + 1 + value.len())?;
        if separator {
            self.out.put_u8(SEPARATOR);
        }
        self.first = false;
        self.out.put_u8(id);
        self.out.put_slice(value);
        Ok(())
    }
}

fn missing(packet_type: PacketType, field: Field) -> CodecError {
    CodecError::MissingField { packet_type, field }
}

fn check_text(field: Field, text: &str, max: usize) -> Result<()> {
    if text.len() > max {
        return Err(CodecError::FieldTooLong {
            field,
            len: text.len(),
            max,
        });
    }
    if text.as_bytes().contains(&SEPARATOR) {
        return Err(CodecError::SeparatorInField { field });
    }
    Ok(())
}

fn decode_header_byte(msg: &mut Message, byte: u8) -> Result<()> {
    let packet_type = msg.packet_type;
    let invalid = |field| CodecError::InvalidHeaderByte {
        packet_type,
        field,
        byte,
    };

    match packet_type.header_byte() {
        HeaderByte::Status => {
            msg.status = Some(status::from_wire(byte).ok_or(invalid(Field::Status))?);
        }
        HeaderByte::DataType if byte == DATA_TYPE_UNDEFINED => {
            return Err(missing(packet_type, Field::DataType));
        }
        HeaderByte::DataType => {
            msg.data_type = Some(DataType::from_wire(byte).ok_or(invalid(Field::DataType))?);
        }
        HeaderByte::Version => {
            msg.version = Some(code_from_wire(byte).ok_or(invalid(Field::Version))?);
        }
        HeaderByte::Event => {
            let event = code_from_wire(byte).and_then(FileEvent::from_code);
            msg.event = Some(event.ok_or(invalid(Field::Event))?);
        }
        HeaderByte::Pad => {}
    }
    Ok(())
}

fn set_once<T>(slot: &mut Option<T>, field: Field, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(CodecError::DuplicateField { field });
    }
    *slot = Some(value);
    Ok(())
}

fn decode_text(field: Field, value: &[u8], max: usize) -> Result<String> {
    if value.len() > max {
        return Err(CodecError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    std::str::from_utf8(value)
        .map(str::to_owned)
        .map_err(|_| CodecError::InvalidUtf8 { field })
}

fn parse_count(field: Field, value: &[u8]) -> Result<u32> {
    let invalid = || CodecError::InvalidCount {
        field,
        text: String::from_utf8_lossy(value).into_owned(),
    };
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(invalid)
}

/// Strictly parse timestamp text: digits with at most one decimal point,
/// within the configured widths.
pub fn parse_timestamp(value: &[u8], limits: TimestampLimits) -> Result<f64> {
    let invalid = |reason| CodecError::InvalidTimestamp {
        text: String::from_utf8_lossy(value).into_owned(),
        reason,
    };

    let mut parts = value.splitn(2, |&b| b == b'.');
    let integer = parts.next().unwrap_or_default();
    let fraction = parts.next();

    for part in std::iter::once(integer).chain(fraction) {
        if !part.iter().all(u8::is_ascii_digit) {
            return Err(invalid("only digits and one decimal point are allowed"));
        }
    }
    if integer.len() + fraction.map_or(0, <[u8]>::len) == 0 {
        return Err(invalid("no digits"));
    }
    if integer.len() > limits.max_integer_digits {
        return Err(invalid("too many integer digits"));
    }
    if fraction.map_or(0, <[u8]>::len) > limits.max_fraction_digits {
        return Err(invalid("too many fraction digits"));
    }

    std::str::from_utf8(value)
        .ok()
        .and_then(|text| text.parse::<f64>().ok())
        .ok_or_else(|| invalid("not a number"))
}
