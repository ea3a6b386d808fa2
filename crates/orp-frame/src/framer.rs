use bytes::Buf;

use crate::codec::{needs_escape, ESCAPE, ESCAPE_MASK, FLAG};
use crate::crc;
use crate::error::{FrameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Data,
    /// Escape byte written; the masked byte is still owed.
    Escaped(u8),
}

/// Incremental transmit-side frame state machine.
///
/// A payload can be streamed through any number of [`pack`](Self::pack)
/// calls into small destination buffers; [`finalize`](Self::finalize) closes
/// the frame. Use a fresh framer (or [`reset`](Self::reset)) per frame.
#[derive(Debug, Clone)]
pub struct Framer {
    state: State,
    crc: u16,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            crc: crc::init(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Pack bytes from `src` into `dst`, returning the bytes written.
    ///
    /// The first call opens the frame with a flag. Returns early when `dst`
    /// fills up; an escape pair may be split across calls.
    pub fn pack<B: Buf>(&mut self, dst: &mut [u8], src: &mut B) -> usize {
        let mut written = 0;

        while written < dst.len() {
            match self.state {
                State::Idle => {
                    dst[written] = FLAG;
                    self.state = State::Data;
                }
                State::Escaped(masked) => {
                    dst[written] = masked;
                    self.state = State::Data;
                }
                State::Data => {
                    if !src.has_remaining() {
                        break;
                    }
                    let byte = src.get_u8();
                    self.crc = crc::update(self.crc, byte);
                    if needs_escape(byte) {
                        dst[written] = ESCAPE;
                        self.state = State::Escaped(byte ^ ESCAPE_MASK);
                    } else {
                        dst[written] = byte;
                    }
                }
            }
            written += 1;
        }

        written
    }

    /// Append the CRC (low byte first) and the closing flag, then reset.
    ///
    /// Space is checked up front; nothing is written on
    /// [`FrameError::BufferTooSmall`].
    pub fn finalize(&mut self, dst: &mut [u8]) -> Result<usize> {
        let crc = self.crc.to_le_bytes();

        let owed = match self.state {
            State::Idle | State::Escaped(_) => 1,
            State::Data => 0,
        };
        let tail: usize = crc.iter().map(|&b| if needs_escape(b) { 2 } else { 1 }).sum();
        let needed = owed + tail + 1;
        if dst.len() < needed {
            return Err(FrameError::BufferTooSmall {
                needed,
                available: dst.len(),
            });
        }

        let mut src = &crc[..];
        let written = self.pack(&mut dst[..needed - 1], &mut src);
        dst[written] = FLAG;
        self.reset();
        Ok(written + 1)
    }
}
