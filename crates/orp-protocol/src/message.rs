use bytes::Bytes;

use crate::packet::{DataType, FileEvent, PacketType};
use crate::status;

/// One protocol message.
///
/// Absent fields are `None` and are left out of the encoded packet. Which of
/// `status`, `data_type`, `version` or `event` travels in header byte 1 is
/// fixed by the packet type.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub packet_type: PacketType,
    pub data_type: Option<DataType>,
    /// Protocol version (sync packets).
    pub version: Option<u8>,
    /// Response status, `0` or negative.
    pub status: Option<i32>,
    /// File-transfer event (file control notifications).
    pub event: Option<FileEvent>,
    pub sequence: u16,
    /// Seconds since the epoch.
    pub timestamp: Option<f64>,
    pub path: Option<String>,
    pub units: Option<String>,
    /// Opaque payload; may contain any byte, separators included.
    pub data: Option<Bytes>,
    pub sent_count: Option<u32>,
    pub received_count: Option<u32>,
    pub mtu: Option<u32>,
}

impl Message {
    /// An empty message of the given type.
    pub fn new(packet_type: PacketType) -> Self {
        Self {
            packet_type,
            data_type: None,
            version: None,
            status: None,
            event: None,
            sequence: 0,
            timestamp: None,
            path: None,
            units: None,
            data: None,
            sent_count: None,
            received_count: None,
            mtu: None,
        }
    }

    /// A response carrying `status`.
    pub fn response(packet_type: PacketType, status: i32) -> Self {
        Self::new(packet_type).with_status(status)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_event(mut self, event: FileEvent) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    /// Data as text, when it is valid UTF-8.
    pub fn data_str(&self) -> Option<&str> {
        self.data
            .as_deref()
            .and_then(|data| std::str::from_utf8(data).ok())
    }

    pub fn is_ok(&self) -> bool {
        self.status == Some(status::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let msg = Message::new(PacketType::PushRequest)
            .with_path("/app/sensor/value")
            .with_data_type(DataType::Numeric)
            .with_timestamp(12345.0)
            .with_data("3.14")
            .with_sequence(7);

        assert_eq!(msg.path.as_deref(), Some("/app/sensor/value"));
        assert_eq!(msg.data_type, Some(DataType::Numeric));
        assert_eq!(msg.timestamp, Some(12345.0));
        assert_eq!(msg.data_str(), Some("3.14"));
        assert_eq!(msg.sequence, 7);
        assert_eq!(msg.status, None);
    }

    #[test]
    fn response_status() {
        let ok = Message::response(PacketType::PushResponse, status::OK);
        assert!(ok.is_ok());
        let failed = Message::response(PacketType::PushResponse, status::NOT_FOUND);
        assert!(!failed.is_ok());
    }

    #[test]
    fn binary_data_is_not_text() {
        let msg = Message::new(PacketType::FileDataRequest).with_data(vec![0xFF, 0xFE]);
        assert_eq!(msg.data_str(), None);
    }
}
