use std::io::{self, Write};

use bytes::Bytes;
use tracing::{debug, warn};

/// Destination for received file data.
pub trait FileSink: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()>;
}

impl<W: Write + Send> FileSink for W {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.write_all(chunk)?;
        self.flush()
    }
}

/// State of one inbound file transfer.
///
/// In auto mode every chunk goes straight to the sink, and auto mode switches
/// itself off once the expected size has arrived. In manual mode the last
/// chunk is held until the application accepts it with [`flush`](Self::flush).
#[derive(Default)]
pub struct FileReceiver {
    sink: Option<Box<dyn FileSink>>,
    auto: bool,
    expected: Option<u64>,
    received: u64,
    cached: Option<Bytes>,
}

impl FileReceiver {
    pub fn new(auto: bool) -> Self {
        Self {
            auto,
            ..Self::default()
        }
    }

    /// Start a new transfer into `sink`.
    ///
    /// An `expected` size of zero means the size is unknown.
    pub fn setup(&mut self, sink: Box<dyn FileSink>, expected: Option<u64>, auto: bool) {
        self.sink = Some(sink);
        self.auto = auto;
        self.expected = expected.filter(|&size| size > 0);
        self.received = 0;
        self.cached = None;
    }

    /// Store one chunk: written now in auto mode, held otherwise. A held
    /// chunk replaces any earlier one that was never acknowledged.
    pub fn cache(&mut self, chunk: Bytes) -> io::Result<()> {
        if !self.auto {
            self.cached = Some(chunk);
            return Ok(());
        }
        self.write(&chunk)?;

        if let Some(expected) = self.expected {
            if self.received >= expected && self.auto {
                debug!(received = self.received, expected, "file transfer complete");
                self.auto = false;
            }
        }
        Ok(())
    }

    /// Write the held chunk. Does nothing in auto mode.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.auto {
            return Ok(());
        }
        match self.cached.take() {
            Some(chunk) => self.write(&chunk),
            None => Ok(()),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(sink) => {
                sink.write_chunk(chunk)?;
                self.received += chunk.len() as u64;
                Ok(())
            }
            None => {
                warn!(len = chunk.len(), "no file sink, dropping file data");
                Err(io::Error::new(io::ErrorKind::NotFound, "no file sink"))
            }
        }
    }

    pub fn is_auto(&self) -> bool {
        self.auto
    }

    pub fn set_auto(&mut self, auto: bool) {
        self.auto = auto;
    }

    /// Bytes of the current transfer written to the sink.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn expected(&self) -> Option<u64> {
        self.expected
    }

    /// Chunk waiting for acknowledgement, if any.
    pub fn pending(&self) -> Option<&Bytes> {
        self.cached.as_ref()
    }

    /// Detach the sink, ending the transfer.
    pub fn take_sink(&mut self) -> Option<Box<dyn FileSink>> {
        self.cached = None;
        self.sink.take()
    }
}

impl std::fmt::Debug for FileReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReceiver")
            .field("has_sink", &self.sink.is_some())
            .field("auto", &self.auto)
            .field("expected", &self.expected)
            .field("received", &self.received)
            .field("pending", &self.cached.as_ref().map(Bytes::len))
            .finish()
    }
}
