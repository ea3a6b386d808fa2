use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::codec::{encode_frame, FrameConfig, FrameDecoder};
use crate::error::FrameError;

/// Tokio codec for HDLC-framed ORP packets.
///
/// Frame-local errors are logged and skipped so a corrupted frame never ends
/// the stream; I/O errors still surface.
#[derive(Debug)]
pub struct HdlcCodec {
    decoder: FrameDecoder,
    max_payload_size: usize,
}

impl HdlcCodec {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            decoder: FrameDecoder::new(config.max_payload_size),
            max_payload_size: config.max_payload_size,
        }
    }
}

impl Default for HdlcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for HdlcCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.decoder.decode(src) {
                Ok(packet) => return Ok(packet),
                Err(err) if err.is_frame_local() => {
                    warn!(error = %err, "dropping frame");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(packet) => Ok(Some(packet)),
            None => {
                // A trailing partial frame cannot complete any more.
                src.clear();
                self.decoder.reset();
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for HdlcCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                max: self.max_payload_size,
            });
        }
        encode_frame(&item, dst)
    }
}
