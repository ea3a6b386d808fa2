use std::collections::VecDeque;

use bytes::BytesMut;
use orp_frame::at::LineDecoder;
use orp_frame::{FrameDecoder, Framing};
use orp_protocol::{status, Message, PacketCodec, PacketType};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::file::FileReceiver;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Receives what the pipeline produces.
pub trait Dispatch {
    /// A decoded message.
    fn dispatch(&mut self, message: Message);

    /// A frame or packet that was discarded.
    fn rejected(&mut self, error: &ClientError) {
        let _ = error;
    }

    /// A text line from the modem (AT framing).
    fn text(&mut self, line: &str) {
        let _ = line;
    }
}

impl Dispatch for Vec<Message> {
    fn dispatch(&mut self, message: Message) {
        self.push(message);
    }
}

#[derive(Debug)]
enum Inbound {
    Hdlc(FrameDecoder),
    At(LineDecoder),
}

/// Turns arbitrary link chunks into dispatched messages.
///
/// Bytes that do not complete a frame stay buffered for the next call. A bad
/// frame or packet is reported and dropped; the pipeline resynchronizes on
/// the next flag.
#[derive(Debug)]
pub struct ReceivePipeline {
    buf: BytesMut,
    inbound: Inbound,
    codec: PacketCodec,
    files: FileReceiver,
    acks: VecDeque<Message>,
    received: u32,
}

impl ReceivePipeline {
    pub fn new(config: &ClientConfig) -> Self {
        let inbound = match config.framing {
            Framing::Hdlc => Inbound::Hdlc(FrameDecoder::new(config.max_packet_size)),
            Framing::At => Inbound::At(LineDecoder::new(config.max_packet_size)),
        };
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            inbound,
            codec: PacketCodec::with_config(config.version, config.codec.clone()),
            files: FileReceiver::new(config.auto_ack),
            acks: VecDeque::new(),
            received: 0,
        }
    }

    /// Process one chunk of link bytes, returning the number of messages
    /// dispatched.
    pub fn feed<D: Dispatch + ?Sized>(&mut self, chunk: &[u8], sink: &mut D) -> usize {
        self.buf.extend_from_slice(chunk);
        if matches!(self.inbound, Inbound::At(_)) {
            self.drain_lines(sink);
            return 0;
        }
        self.drain_frames(sink)
    }

    fn drain_frames<D: Dispatch + ?Sized>(&mut self, sink: &mut D) -> usize {
        let Inbound::Hdlc(decoder) = &mut self.inbound else {
            return 0;
        };

        let mut dispatched = 0;
        loop {
            let packet = match decoder.decode(&mut self.buf) {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "dropping frame");
                    sink.rejected(&ClientError::from(err));
                    continue;
                }
            };

            let message = match self.codec.decode(&packet) {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, len = packet.len(), "dropping packet");
                    sink.rejected(&ClientError::from(err));
                    continue;
                }
            };

            debug!(
                packet_type = %message.packet_type,
                sequence = message.sequence,
                len = packet.len(),
                "received"
            );
            if message.packet_type == PacketType::FileDataRequest {
                store_file_data(&mut self.files, &mut self.acks, &message);
            }
            self.received = self.received.wrapping_add(1);
            sink.dispatch(message);
            dispatched += 1;
        }
        dispatched
    }

    fn drain_lines<D: Dispatch + ?Sized>(&mut self, sink: &mut D) {
        let Inbound::At(lines) = &mut self.inbound else {
            return;
        };

        loop {
            match lines.decode(&mut self.buf) {
                Ok(Some(line)) => sink.text(&line),
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "dropping line");
                    sink.rejected(&ClientError::from(err));
                }
            }
        }
    }

    /// Oldest acknowledgement not yet sent.
    pub fn next_ack(&self) -> Option<&Message> {
        self.acks.front()
    }

    /// Drop the oldest acknowledgement once it is on the link.
    pub fn ack_sent(&mut self) -> Option<Message> {
        self.acks.pop_front()
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    /// Take every queued acknowledgement.
    pub fn take_acks(&mut self) -> Vec<Message> {
        self.acks.drain(..).collect()
    }

    /// Messages dispatched so far, wrapping.
    pub fn received(&self) -> u32 {
        self.received
    }

    /// Bytes buffered but not yet part of a complete frame or line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
            + match &self.inbound {
                Inbound::Hdlc(decoder) => decoder.pending(),
                Inbound::At(_) => 0,
            }
    }

    pub fn codec(&self) -> &PacketCodec {
        &self.codec
    }

    pub fn files(&self) -> &FileReceiver {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileReceiver {
        &mut self.files
    }
}

/// Hand a file data chunk to the receiver, queueing its acknowledgement when
/// the receiver was in auto mode.
fn store_file_data(files: &mut FileReceiver, acks: &mut VecDeque<Message>, message: &Message) {
    let Some(chunk) = message.data.clone().filter(|data| !data.is_empty()) else {
        return;
    };

    let ack = files.is_auto();
    if let Err(err) = files.cache(chunk) {
        warn!(error = %err, sequence = message.sequence, "file data not stored");
        return;
    }
    if ack {
        acks.push_back(
            Message::response(PacketType::FileDataResponse, status::OK)
                .with_sequence(message.sequence),
        );
    }
}
