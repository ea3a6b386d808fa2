use orp_protocol::PacketType;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] orp_frame::FrameError),

    /// Packet encode or decode error.
    #[error("codec error: {0}")]
    Codec(#[from] orp_protocol::CodecError),

    /// Link I/O error.
    #[error("link error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoded packet exceeds the configured maximum.
    #[error("packet of {len} bytes exceeds maximum of {max}")]
    PacketTooLarge { len: usize, max: usize },

    /// The packet type cannot be sent by this operation.
    #[error("{0} cannot be sent by this operation")]
    BadParameter(PacketType),

    /// JSON example is not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
