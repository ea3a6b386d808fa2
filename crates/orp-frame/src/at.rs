//! AT-command framing for clean text links.
//!
//! A packet travels as `AT+ORP="<type><byte1>00<rest>"\n`: no escaping and no
//! CRC. The sequence number is not carried; the modem answers with plain text
//! lines.

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

const PREFIX: &[u8] = b"AT+ORP=\"";
const SUFFIX: &[u8] = b"\"\n";

/// Packet header length: type, byte 1 and the two sequence bytes.
const HEADER_LEN: usize = 4;

/// Size of the command line [`pack`] produces for `packet`.
pub fn command_len(packet: &[u8]) -> usize {
    PREFIX.len() + packet.len() + SUFFIX.len()
}

/// Wrap a packet as an `AT+ORP` command line, returning the bytes written.
///
/// An undefined byte 1 (NUL or space) is sent as `'0'`; the sequence number is
/// replaced by `"00"`.
pub fn pack(packet: &[u8], dst: &mut [u8]) -> Result<usize> {
    if packet.len() < HEADER_LEN {
        return Err(FrameError::PacketTooShort {
            len: packet.len(),
            min: HEADER_LEN,
        });
    }
    let needed = command_len(packet);
    if dst.len() < needed {
        return Err(FrameError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }

    let mut out = &mut dst[..needed];
    out.put_slice(PREFIX);
    out.put_u8(packet[0]);
    out.put_u8(match packet[1] {
        0 | b' ' => b'0',
        byte => byte,
    });
    out.put_slice(b"00");
    out.put_slice(&packet[HEADER_LEN..]);
    out.put_slice(SUFFIX);
    Ok(needed)
}

/// Append an `AT+ORP` command line to `dst`.
pub fn encode(packet: &[u8], dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    dst.resize(start + command_len(packet), 0);
    match pack(packet, &mut dst[start..]) {
        Ok(_) => Ok(()),
        Err(err) => {
            dst.truncate(start);
            Err(err)
        }
    }
}

/// Splits modem output into text lines.
#[derive(Debug)]
pub struct LineDecoder {
    max_line: usize,
    discarding: bool,
}

impl LineDecoder {
    pub fn new(max_line: usize) -> Self {
        Self {
            max_line,
            discarding: false,
        }
    }

    /// Take the next complete line from `src`, without its line ending.
    ///
    /// Empty lines are skipped. A line longer than the limit is reported once
    /// and dropped up to its newline.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let Some(end) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_line {
                    src.clear();
                    if !self.discarding {
                        self.discarding = true;
                        return Err(FrameError::PayloadTooLarge { max: self.max_line });
                    }
                }
                return Ok(None);
            };

            let line = src.split_to(end + 1);
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() - 1 > self.max_line {
                return Err(FrameError::PayloadTooLarge { max: self.max_line });
            }

            let mut text = &line[..end];
            if text.last() == Some(&b'\r') {
                text = &text[..text.len() - 1];
            }
            if text.is_empty() {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(text).into_owned()));
        }
    }

    /// Drop any partial line state.
    pub fn reset(&mut self) {
        self.discarding = false;
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(crate::codec::DEFAULT_MAX_PAYLOAD)
    }
}
