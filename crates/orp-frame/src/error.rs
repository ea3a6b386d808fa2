/// Sentinel for an unspecified framing failure (e.g. insufficient space).
pub const ERROR_UNSPECIFIED: i32 = -1;
/// Sentinel for a CRC mismatch.
pub const ERROR_CRC: i32 = -2;
/// Sentinel for a malformed frame.
pub const ERROR_FRAME: i32 = -3;

/// Errors that can occur during frame packing/unpacking.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The CRC carried by the frame does not match the CRC of its payload.
    #[error("frame CRC mismatch (calculated {calculated:#06x}, received {received:#06x})")]
    CrcMismatch { calculated: u16, received: u16 },

    /// A flag or escape byte followed an escape byte.
    #[error("invalid escape sequence [0x7d, {byte:#04x}]")]
    InvalidEscape { byte: u8 },

    /// The frame ended before its two CRC bytes were received.
    #[error("runt frame ({len} bytes, need at least 2 for the CRC)")]
    RuntFrame { len: usize },

    /// The destination buffer cannot hold the output.
    #[error("buffer too small ({available} bytes available, {needed} needed)")]
    BufferTooSmall { needed: usize, available: usize },

    /// The unframed payload does not fit the configured packet buffer.
    #[error("frame payload exceeds {max} bytes")]
    PayloadTooLarge { max: usize },

    /// The packet is too short to carry a protocol header.
    #[error("packet too short ({len} bytes, min {min})")]
    PacketTooShort { len: usize, min: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Negative sentinel for this error: unspecified, CRC or framing.
    pub fn code(&self) -> i32 {
        match self {
            FrameError::CrcMismatch { .. } => ERROR_CRC,
            FrameError::InvalidEscape { .. } | FrameError::RuntFrame { .. } => ERROR_FRAME,
            _ => ERROR_UNSPECIFIED,
        }
    }

    /// Whether the error only affects the current frame; the link stays usable.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            FrameError::CrcMismatch { .. }
                | FrameError::InvalidEscape { .. }
                | FrameError::RuntFrame { .. }
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
