use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::at::LineDecoder;
use crate::codec::{FrameConfig, FrameDecoder, Framing};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

#[derive(Debug)]
enum Inbound {
    Hdlc(FrameDecoder),
    At(LineDecoder),
}

/// Reads complete packets from any `Read` link.
///
/// Handles partial reads internally; callers always get complete packets.
/// Frame-local errors (CRC mismatch, bad escape, oversize) are returned but
/// leave the reader usable: the next call resynchronizes on the next flag.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    inbound: Inbound,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        let inbound = match config.framing {
            Framing::Hdlc => Inbound::Hdlc(FrameDecoder::new(config.max_payload_size)),
            Framing::At => Inbound::At(LineDecoder::new(config.max_payload_size)),
        };
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            inbound,
            config,
        }
    }

    /// Read the next complete packet (blocking).
    ///
    /// In AT mode each packet is one text line from the modem.
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            let decoded = match &mut self.inbound {
                Inbound::Hdlc(decoder) => decoder.decode(&mut self.buf)?,
                Inbound::At(lines) => lines.decode(&mut self.buf)?.map(Bytes::from),
            };
            if let Some(packet) = decoded {
                return Ok(packet);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying link.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying link.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner link.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
