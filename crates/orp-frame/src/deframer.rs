use bytes::Buf;
use tracing::debug;

use crate::codec::{ESCAPE, ESCAPE_MASK, FLAG};
use crate::crc;
use crate::error::{FrameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Search,
    StartFound,
    Data,
    Escaped,
    Complete,
}

/// Incremental receive-side frame state machine.
///
/// The last two data bytes of a frame are its CRC, and the frame length is
/// not known until the closing flag arrives, so output lags input by two
/// bytes: a byte is only written out and folded into the running CRC once a
/// later data byte proves it was payload.
#[derive(Debug, Clone)]
pub struct Deframer {
    state: State,
    crc: u16,
    count: usize,
    lookback: [u8; 2],
    slot: usize,
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            crc: crc::init(),
            count: 0,
            lookback: [0; 2],
            slot: 0,
        }
    }

    /// Return to idle, dropping any partial frame.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether the last [`unpack`](Self::unpack) call ended a frame with a valid CRC.
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Unescaped bytes of the current frame seen so far, CRC bytes included.
    pub fn received(&self) -> usize {
        self.count
    }

    /// Unpack bytes from `src` into `dst`, returning the payload bytes written.
    ///
    /// Stops when the frame completes, when `src` is exhausted, or when the
    /// next payload byte has no room in `dst`. The closing flag is left in
    /// `src` so it can open the next frame. On error the state returns to idle.
    pub fn unpack<B: Buf>(&mut self, dst: &mut [u8], src: &mut B) -> Result<usize> {
        let mut written = 0;

        while src.has_remaining() {
            let byte = src.chunk()[0];

            match self.state {
                State::Idle | State::Complete => {
                    self.reset();
                    self.state = State::Search;
                    continue;
                }
                State::Search => {
                    src.advance(1);
                    if byte == FLAG {
                        self.state = State::StartFound;
                    }
                }
                State::StartFound | State::Data => match byte {
                    FLAG if self.state == State::StartFound => src.advance(1),
                    FLAG => return self.close().map(|()| written),
                    ESCAPE => {
                        src.advance(1);
                        self.state = State::Escaped;
                    }
                    _ => {
                        if !self.accept(byte, dst, &mut written) {
                            break;
                        }
                        src.advance(1);
                    }
                },
                State::Escaped => match byte {
                    FLAG => return Err(self.fail(FrameError::InvalidEscape { byte })),
                    ESCAPE => {
                        src.advance(1);
                        return Err(self.fail(FrameError::InvalidEscape { byte }));
                    }
                    _ => {
                        if !self.accept(byte ^ ESCAPE_MASK, dst, &mut written) {
                            break;
                        }
                        src.advance(1);
                    }
                },
            }
        }

        Ok(written)
    }

    /// Push one unescaped data byte through the lookback ring.
    ///
    /// Returns `false` without touching any state when the byte it would
    /// release has no room in `dst`.
    fn accept(&mut self, byte: u8, dst: &mut [u8], written: &mut usize) -> bool {
        if self.count >= 2 {
            if *written >= dst.len() {
                return false;
            }
            let payload = self.lookback[self.slot];
            dst[*written] = payload;
            *written += 1;
            self.crc = crc::update(self.crc, payload);
        }
        self.lookback[self.slot] = byte;
        self.slot ^= 1;
        self.count += 1;
        self.state = State::Data;
        true
    }

    fn close(&mut self) -> Result<()> {
        if self.count < 2 {
            let len = self.count;
            return Err(self.fail(FrameError::RuntFrame { len }));
        }

        // `slot` points at the older entry: the CRC low byte.
        let received = u16::from_le_bytes([self.lookback[self.slot], self.lookback[self.slot ^ 1]]);
        if received != self.crc {
            let calculated = self.crc;
            return Err(self.fail(FrameError::CrcMismatch {
                calculated,
                received,
            }));
        }

        self.state = State::Complete;
        Ok(())
    }

    fn fail(&mut self, err: FrameError) -> FrameError {
        debug!(error = %err, received = self.count, "frame dropped");
        self.reset();
        err
    }
}
