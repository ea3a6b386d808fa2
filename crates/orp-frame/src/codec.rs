use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::crc;
use crate::deframer::Deframer;
use crate::error::{FrameError, Result};
use crate::framer::Framer;

/// Frame delimiter.
pub const FLAG: u8 = 0x7E;

/// Escape byte; the following byte is XORed with [`ESCAPE_MASK`].
pub const ESCAPE: u8 = 0x7D;

/// Mask applied to an escaped byte.
pub const ESCAPE_MASK: u8 = 0x20;

/// Worst-case framing overhead: leading flag + CRC (up to 4 bytes escaped) + trailing flag.
pub const HDLC_OVERHEAD: usize = 6;

/// Default maximum unframed payload: 64 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// Link framing strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Byte-stuffed frames with CRC.
    #[default]
    Hdlc,
    /// `AT+ORP="..."` command lines; no escaping, no CRC.
    At,
}

/// Configuration for the frame layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum unframed payload size in bytes. Default: 64 KiB.
    pub max_payload_size: usize,
    /// Link framing strategy. Default: HDLC.
    pub framing: Framing,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            framing: Framing::Hdlc,
        }
    }
}

#[inline]
pub(crate) fn needs_escape(byte: u8) -> bool {
    byte == FLAG || byte == ESCAPE
}

#[inline]
fn escaped_len(byte: u8) -> usize {
    if needs_escape(byte) {
        2
    } else {
        1
    }
}

/// Exact size of the frame that [`frame_packet`] produces for `payload`.
pub fn framed_len(payload: &[u8]) -> usize {
    let body: usize = payload.iter().map(|&b| escaped_len(b)).sum();
    let tail: usize = crc::checksum(payload)
        .to_le_bytes()
        .iter()
        .map(|&b| escaped_len(b))
        .sum();
    1 + body + tail + 1
}

/// Frame a complete packet into `dst`, returning the frame length.
///
/// Wire format:
/// ```text
/// ┌──────┬──────────────────┬──────────┬──────────┬──────┐
/// │ 0x7E │ escaped payload  │ CRC LSB  │ CRC MSB  │ 0x7E │
/// │      │                  │ (esc.)   │ (esc.)   │      │
/// └──────┴──────────────────┴──────────┴──────────┴──────┘
/// ```
///
/// Nothing is written when `dst` is too small.
pub fn frame_packet(payload: &[u8], dst: &mut [u8]) -> Result<usize> {
    let needed = framed_len(payload);
    if dst.len() < needed {
        return Err(FrameError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }

    let mut framer = Framer::new();
    let mut src = payload;
    let body = framer.pack(dst, &mut src);
    let tail = framer.finalize(&mut dst[body..])?;
    Ok(body + tail)
}

/// Frame a packet into a new buffer.
pub fn frame_to_vec(payload: &[u8]) -> Vec<u8> {
    let mut dst = vec![0u8; framed_len(payload)];
    let mut framer = Framer::new();
    let mut src = payload;
    let body = framer.pack(&mut dst, &mut src);
    // Sized by framed_len, so finalize always has room.
    let tail = framer.finalize(&mut dst[body..]).unwrap_or(0);
    dst.truncate(body + tail);
    dst
}

/// Append a framed packet to `dst`.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    dst.resize(start + framed_len(payload), 0);
    let written = frame_packet(payload, &mut dst[start..])?;
    dst.truncate(start + written);
    Ok(())
}

/// Reassembles packets from an inbound byte buffer.
///
/// Owns the deframing context and a fixed-capacity packet buffer; bytes are
/// consumed from the caller's buffer as they are processed.
#[derive(Debug)]
pub struct FrameDecoder {
    deframer: Deframer,
    packet: Box<[u8]>,
    len: usize,
}

impl FrameDecoder {
    /// Create a decoder accepting payloads up to `max_payload` bytes.
    pub fn new(max_payload: usize) -> Self {
        Self {
            deframer: Deframer::new(),
            packet: vec![0u8; max_payload].into_boxed_slice(),
            len: 0,
        }
    }

    /// Decode the next packet from `src`.
    ///
    /// Returns `Ok(None)` once `src` is exhausted without completing a frame;
    /// the partial frame is kept for the next call. On error the partial frame
    /// is dropped and the bytes that caused it stay consumed, so calling again
    /// resynchronizes on the next flag.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        while src.has_remaining() {
            let before = src.remaining();
            let written = match self.deframer.unpack(&mut self.packet[self.len..], src) {
                Ok(written) => written,
                Err(err) => {
                    self.len = 0;
                    return Err(err);
                }
            };
            self.len += written;

            if self.deframer.is_complete() {
                let packet = Bytes::copy_from_slice(&self.packet[..self.len]);
                trace!(len = self.len, "frame complete");
                self.len = 0;
                self.deframer.reset();
                return Ok(Some(packet));
            }

            if src.remaining() == before {
                // The deframer stalled on a payload byte with no room left.
                self.len = 0;
                self.deframer.reset();
                return Err(FrameError::PayloadTooLarge {
                    max: self.packet.len(),
                });
            }
        }
        Ok(None)
    }

    /// Drop any partial frame.
    pub fn reset(&mut self) {
        self.len = 0;
        self.deframer.reset();
    }

    /// Bytes of the current partial frame held so far.
    pub fn pending(&self) -> usize {
        self.len
    }

    /// Capacity of the packet buffer.
    pub fn max_payload(&self) -> usize {
        self.packet.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;

    fn all_splits_decode(wire: &[u8], expected: &[u8]) {
        for first in 0..=wire.len() {
            for second in first..=wire.len() {
                let mut decoder = FrameDecoder::new(256);
                let mut buf = BytesMut::new();
                let mut packets = Vec::new();
                for chunk in [&wire[..first], &wire[first..second], &wire[second..]] {
                    buf.extend_from_slice(chunk);
                    while let Some(packet) = decoder.decode(&mut buf).unwrap() {
                        packets.push(packet);
                    }
                }
                assert_eq!(packets.len(), 1, "split at {first}/{second}");
                assert_eq!(packets[0].as_ref(), expected, "split at {first}/{second}");
            }
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"PN\x01\x00T12345,P/app/sensor/value,D3.14";

        encode_frame(payload, &mut buf).unwrap();
        assert_eq!(buf.len(), framed_len(payload));
        assert_eq!(buf[0], FLAG);
        assert_eq!(buf[buf.len() - 1], FLAG);

        let mut decoder = FrameDecoder::default();
        let packet = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.as_ref(), payload);
    }

    #[test]
    fn test_reserved_bytes_are_escaped() {
        let payload = [0x7E, 0x41, 0x7D];
        let mut dst = [0u8; 32];
        let len = frame_packet(&payload, &mut dst).unwrap();
        let frame = &dst[..len];

        assert_eq!(&frame[..6], &[FLAG, ESCAPE, 0x5E, 0x41, ESCAPE, 0x5D]);
        assert!(!frame[1..len - 1].contains(&FLAG));
    }

    #[test]
    fn test_crc_is_low_byte_first() {
        let payload = b"123456789";
        let mut dst = [0u8; 32];
        let len = frame_packet(payload, &mut dst).unwrap();
        // 0x29B1: neither byte needs escaping.
        assert_eq!(&dst[len - 3..len], &[0xB1, 0x29, FLAG]);
    }

    #[test]
    fn test_roundtrip_across_every_split() {
        let payload = [0x7E, b',', 0x7D, 0x00, 0x5E, 0x7E, 0x7E, b'D'];
        let mut wire = BytesMut::new();
        encode_frame(&payload, &mut wire).unwrap();
        all_splits_decode(&wire, &payload);
    }

    #[test]
    fn test_roundtrip_byte_values() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let mut wire = BytesMut::new();
        encode_frame(&payload, &mut wire).unwrap();

        let mut decoder = FrameDecoder::new(512);
        let mut buf = BytesMut::new();
        let mut out = None;
        for chunk in wire.chunks(7) {
            buf.extend_from_slice(chunk);
            if let Some(packet) = decoder.decode(&mut buf).unwrap() {
                out = Some(packet);
            }
        }
        assert_eq!(out.unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn test_frame_packet_rejects_small_buffer_without_writing() {
        let payload = b"hello";
        let mut dst = [0xAAu8; 6];
        let err = frame_packet(payload, &mut dst).unwrap_err();
        assert!(matches!(err, FrameError::BufferTooSmall { available: 6, .. }));
        assert_eq!(dst, [0xAA; 6]);
    }

    #[test]
    fn test_empty_payload() {
        let mut wire = BytesMut::new();
        encode_frame(b"", &mut wire).unwrap();
        // flag, 0xFF, 0xFF, flag
        assert_eq!(wire.as_ref(), &[FLAG, 0xFF, 0xFF, FLAG]);

        let mut decoder = FrameDecoder::default();
        let packet = decoder.decode(&mut wire).unwrap().unwrap();
        assert!(packet.is_empty());
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let mut decoder = FrameDecoder::default();
        let f1 = decoder.decode(&mut buf).unwrap().unwrap();
        let f2 = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(f1.as_ref(), b"first");
        assert_eq!(f2.as_ref(), b"second");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_frames_sharing_a_flag() {
        let mut first = BytesMut::new();
        encode_frame(b"one", &mut first).unwrap();
        let mut second = BytesMut::new();
        encode_frame(b"two", &mut second).unwrap();

        // Drop the leading flag of the second frame.
        let mut buf = BytesMut::new();
        buf.put_slice(&first);
        buf.put_slice(&second[1..]);

        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap().as_ref(), b"one");
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap().as_ref(), b"two");
    }

    #[test]
    fn test_garbage_then_valid_frame() {
        let mut buf = BytesMut::from(&b"\x01\x02noise\x7D\x00"[..]);
        encode_frame(b"valid", &mut buf).unwrap();

        let mut decoder = FrameDecoder::default();
        let packet = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.as_ref(), b"valid");
    }

    #[test]
    fn test_single_bit_flips_never_decode_silently() {
        let payload = b"PN\x00\x00T12345,P/app/sensor/value,D3.14";
        let mut wire = BytesMut::new();
        encode_frame(payload, &mut wire).unwrap();

        for index in 1..wire.len() - 1 {
            for bit in 0..8 {
                let mut corrupted = BytesMut::from(&wire[..]);
                corrupted[index] ^= 1 << bit;

                let mut decoder = FrameDecoder::new(256);
                let mut outcome = Vec::new();
                loop {
                    match decoder.decode(&mut corrupted) {
                        Ok(Some(packet)) => outcome.push(Ok(packet)),
                        Ok(None) => break,
                        Err(err) => outcome.push(Err(err)),
                    }
                }
                assert!(
                    !outcome.iter().any(|r| matches!(r, Ok(p) if !p.is_empty())),
                    "byte {index} bit {bit} decoded: {outcome:?}"
                );
            }
        }
    }

    #[test]
    fn test_crc_mismatch_then_recovery() {
        let mut wire = BytesMut::new();
        encode_frame(b"broken", &mut wire).unwrap();
        wire[2] ^= 0x01;
        encode_frame(b"intact", &mut wire).unwrap();

        let mut decoder = FrameDecoder::default();
        let err = decoder.decode(&mut wire).unwrap_err();
        assert!(matches!(err, FrameError::CrcMismatch { .. }));
        let packet = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(packet.as_ref(), b"intact");
    }

    #[test]
    fn test_payload_too_large() {
        let mut wire = BytesMut::new();
        encode_frame(&[0x41; 32], &mut wire).unwrap();
        encode_frame(b"ok", &mut wire).unwrap();

        let mut decoder = FrameDecoder::new(16);
        let err = decoder.decode(&mut wire).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { max: 16 }));

        let packet = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(packet.as_ref(), b"ok");
    }

    #[test]
    fn test_payload_exactly_filling_buffer() {
        let mut wire = BytesMut::new();
        encode_frame(&[0x7E; 16], &mut wire).unwrap();

        let mut decoder = FrameDecoder::new(16);
        let packet = decoder.decode(&mut wire).unwrap().unwrap();
        assert_eq!(packet.as_ref(), &[0x7E; 16]);
    }

    #[test]
    fn test_partial_frame_is_kept() {
        let mut wire = BytesMut::new();
        encode_frame(b"partial", &mut wire).unwrap();
        let mut buf = BytesMut::from(&wire[..5]);

        let mut decoder = FrameDecoder::default();
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.pending() > 0);

        buf.extend_from_slice(&wire[5..]);
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap().as_ref(), b"partial");
    }
}
