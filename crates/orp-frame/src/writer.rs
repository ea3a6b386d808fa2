use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::at;
use crate::codec::{encode_frame, FrameConfig, Framing};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete packets to any `Write` link.
///
/// Each packet is framed by a fresh [`Framer`](crate::Framer) (or wrapped as
/// an AT command line) and written out in full before `send` returns.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Frame and send one packet, returning the bytes put on the link.
    pub fn send(&mut self, packet: &[u8]) -> Result<usize> {
        if packet.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        match self.config.framing {
            Framing::Hdlc => encode_frame(packet, &mut self.buf)?,
            Framing::At => at::encode(packet, &mut self.buf)?,
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        trace!(packet = packet.len(), wire = offset, "frame sent");

        self.flush()?;
        Ok(offset)
    }

    /// Flush the underlying link.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
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

    /// Consume the writer and return the inner link.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
