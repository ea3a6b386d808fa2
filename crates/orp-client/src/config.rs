use orp_frame::Framing;
use orp_protocol::{CodecConfig, ProtocolVersion, MAX_PACKET_LEN};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Protocol revision used for encoding and sent in sync packets.
    pub version: ProtocolVersion,
    /// Link framing. Default: HDLC.
    pub framing: Framing,
    /// Largest packet sent or reassembled. Default: [`MAX_PACKET_LEN`].
    pub max_packet_size: usize,
    /// Acknowledge file data chunks as soon as they are stored. Default: false.
    pub auto_ack: bool,
    /// MTU advertised in sync packets. Default: none.
    pub mtu: Option<u32>,
    pub codec: CodecConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::default(),
            framing: Framing::Hdlc,
            max_packet_size: MAX_PACKET_LEN,
            auto_ack: false,
            mtu: None,
            codec: CodecConfig::default(),
        }
    }
}
