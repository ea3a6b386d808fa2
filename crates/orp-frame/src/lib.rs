//! Byte-stuffed link framing for ORP serial links.
//!
//! Every packet travels inside a simplified asynchronous HDLC frame:
//! - A `0x7E` flag at both ends
//! - `0x7D` escaping of any flag or escape byte in the payload (XOR `0x20`)
//! - A trailing CRC-16/CCITT over the unescaped payload, low byte first
//!
//! Both directions are incremental: payloads can be streamed through small
//! destination buffers, and received bytes can arrive in any split.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod at;
pub mod codec;
pub mod crc;
pub mod deframer;
pub mod error;
pub mod framer;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::HdlcCodec;
pub use codec::{
    encode_frame, frame_packet, frame_to_vec, framed_len, FrameConfig, FrameDecoder, Framing,
    DEFAULT_MAX_PAYLOAD, ESCAPE, ESCAPE_MASK, FLAG, HDLC_OVERHEAD,
};
pub use deframer::Deframer;
pub use error::{FrameError, Result};
pub use framer::Framer;
pub use reader::FrameReader;
pub use writer::FrameWriter;
