use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;
use orp_frame::{FrameConfig, FrameError, FrameWriter};
use orp_protocol::{DataType, FileEvent, Message, PacketCodec, PacketType};
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::file::FileSink;
use crate::pipeline::{Dispatch, ReceivePipeline};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// ORP client over one serial link.
///
/// Requests are numbered from an internal wrapping counter; responses echo
/// the sequence number of the packet they answer. Every operation frames and
/// writes one packet before returning.
pub struct OrpClient<L> {
    writer: FrameWriter<L>,
    pipeline: ReceivePipeline,
    codec: PacketCodec,
    config: ClientConfig,
    sequence: u16,
    sent: u32,
}

impl<L: Read + Write> OrpClient<L> {
    /// Create a client with default configuration.
    pub fn new(link: L) -> Self {
        Self::with_config(link, ClientConfig::default())
    }

    /// Create a client with explicit configuration.
    pub fn with_config(link: L, config: ClientConfig) -> Self {
        let frame_config = FrameConfig {
            max_payload_size: config.max_packet_size,
            framing: config.framing,
        };
        Self {
            writer: FrameWriter::with_config(link, frame_config),
            pipeline: ReceivePipeline::new(&config),
            codec: PacketCodec::with_config(config.version, config.codec.clone()),
            config,
            sequence: 0,
            sent: 0,
        }
    }

    /// Create an input resource.
    pub fn create_input(
        &mut self,
        path: &str,
        data_type: DataType,
        units: Option<&str>,
    ) -> Result<u16> {
        let msg = with_units(
            Message::new(PacketType::InputCreateRequest)
                .with_path(path)
                .with_data_type(data_type),
            units,
        );
        self.request(msg)
    }

    /// Create an output resource.
    pub fn create_output(
        &mut self,
        path: &str,
        data_type: DataType,
        units: Option<&str>,
    ) -> Result<u16> {
        let msg = with_units(
            Message::new(PacketType::OutputCreateRequest)
                .with_path(path)
                .with_data_type(data_type),
            units,
        );
        self.request(msg)
    }

    pub fn delete(&mut self, path: &str) -> Result<u16> {
        self.request(Message::new(PacketType::DeleteRequest).with_path(path))
    }

    pub fn add_push_handler(&mut self, path: &str) -> Result<u16> {
        self.request(Message::new(PacketType::HandlerAddRequest).with_path(path))
    }

    pub fn remove_push_handler(&mut self, path: &str) -> Result<u16> {
        self.request(Message::new(PacketType::HandlerRemoveRequest).with_path(path))
    }

    /// Push a value. A trigger carries no value.
    pub fn push(
        &mut self,
        path: &str,
        data_type: DataType,
        timestamp: f64,
        value: Option<&str>,
    ) -> Result<u16> {
        let mut msg = Message::new(PacketType::PushRequest)
            .with_path(path)
            .with_data_type(data_type)
            .with_timestamp(timestamp);
        if let Some(value) = value {
            msg = msg.with_data(Bytes::copy_from_slice(value.as_bytes()));
        }
        self.request(msg)
    }

    pub fn get(&mut self, path: &str) -> Result<u16> {
        self.request(Message::new(PacketType::GetRequest).with_path(path))
    }

    /// Set the JSON example of a resource. `example` must be valid JSON.
    pub fn set_json_example(&mut self, path: &str, example: &str) -> Result<u16> {
        serde_json::from_str::<serde_json::Value>(example)?;
        self.request(
            Message::new(PacketType::ExampleSetRequest)
                .with_path(path)
                .with_data_type(DataType::Json)
                .with_data(Bytes::copy_from_slice(example.as_bytes())),
        )
    }

    pub fn create_sensor(
        &mut self,
        path: &str,
        data_type: DataType,
        units: Option<&str>,
    ) -> Result<u16> {
        let msg = with_units(
            Message::new(PacketType::SensorCreateRequest)
                .with_path(path)
                .with_data_type(data_type),
            units,
        );
        self.request(msg)
    }

    pub fn remove_sensor(&mut self, path: &str) -> Result<u16> {
        self.request(Message::new(PacketType::SensorRemoveRequest).with_path(path))
    }

    /// Answer a notification or file transfer packet.
    ///
    /// Only handler call, sensor call, file data and file control responses
    /// are accepted. An OK file data response releases the held chunk to the
    /// file sink first.
    pub fn respond(&mut self, packet_type: PacketType, status: i32, sequence: u16) -> Result<()> {
        match packet_type {
            PacketType::HandlerCallResponse
            | PacketType::SensorCallResponse
            | PacketType::FileControlResponse => {}
            PacketType::FileDataResponse => {
                if status == orp_protocol::status::OK {
                    self.pipeline.files_mut().flush()?;
                }
            }
            other => return Err(ClientError::BadParameter(other)),
        }
        self.send(&Message::response(packet_type, status).with_sequence(sequence))
    }

    /// Send a sync packet carrying the protocol version, the message counts
    /// and the configured MTU.
    pub fn sync(&mut self, packet_type: PacketType) -> Result<u16> {
        if !packet_type.is_sync() {
            return Err(ClientError::BadParameter(packet_type));
        }
        let mut msg = Message::new(packet_type).with_version(self.codec.version().number());
        msg.sent_count = Some(self.sent);
        msg.received_count = Some(self.pipeline.received());
        msg.mtu = self.config.mtu;
        self.request(msg)
    }

    /// Send a file control notification. `control` carries event details such
    /// as a file name and size.
    pub fn file_notify(&mut self, event: FileEvent, control: Option<&str>) -> Result<u16> {
        let mut msg = Message::new(PacketType::FileControlNotify).with_event(event);
        if let Some(control) = control {
            msg = msg.with_data(Bytes::copy_from_slice(control.as_bytes()));
        }
        self.request(msg)
    }

    /// Send one chunk of file data.
    pub fn file_data(&mut self, data: impl Into<Bytes>) -> Result<u16> {
        self.request(Message::new(PacketType::FileDataRequest).with_data(data))
    }

    /// Prepare to receive a file into `sink`.
    pub fn receive_file(&mut self, sink: Box<dyn FileSink>, expected: Option<u64>, auto: bool) {
        self.pipeline.files_mut().setup(sink, expected, auto);
    }

    /// Read once from the link and dispatch what arrived.
    ///
    /// Queued file data acknowledgements are sent before returning. Returns
    /// the number of messages dispatched; an interrupted or would-block read
    /// dispatches nothing.
    pub fn poll<D: Dispatch + ?Sized>(&mut self, sink: &mut D) -> Result<usize> {
        self.send_acks()?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = match self.writer.get_mut().read(&mut chunk) {
            Ok(0) => return Err(FrameError::ConnectionClosed.into()),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(0),
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
            Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        trace!(len = read, "link read");

        let dispatched = self.pipeline.feed(&chunk[..read], sink);
        self.send_acks()?;
        Ok(dispatched)
    }

    /// Send queued acknowledgements in order. An acknowledgement stays queued
    /// until it is written, so a failed write is retried by the next call.
    pub fn send_acks(&mut self) -> Result<()> {
        while let Some(ack) = self.pipeline.next_ack().cloned() {
            self.send(&ack)?;
            self.pipeline.ack_sent();
        }
        Ok(())
    }

    /// Send an arbitrary message as-is.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        let packet = self.codec.encode_to_bytes(msg)?;
        if packet.len() > self.config.max_packet_size {
            return Err(ClientError::PacketTooLarge {
                len: packet.len(),
                max: self.config.max_packet_size,
            });
        }
        let wire = self.writer.send(&packet)?;
        self.sent = self.sent.wrapping_add(1);
        debug!(
            packet_type = %msg.packet_type,
            sequence = msg.sequence,
            len = packet.len(),
            wire,
            "sent"
        );
        Ok(())
    }

    fn request(&mut self, msg: Message) -> Result<u16> {
        let sequence = self.sequence;
        self.send(&msg.with_sequence(sequence))?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(sequence)
    }

    /// Messages sent so far, wrapping.
    pub fn sent(&self) -> u32 {
        self.sent
    }

    /// Messages received so far, wrapping.
    pub fn received(&self) -> u32 {
        self.pipeline.received()
    }

    pub fn pipeline(&self) -> &ReceivePipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut ReceivePipeline {
        &mut self.pipeline
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Borrow the underlying link.
    pub fn get_ref(&self) -> &L {
        self.writer.get_ref()
    }

    /// Mutably borrow the underlying link.
    pub fn get_mut(&mut self) -> &mut L {
        self.writer.get_mut()
    }

    /// Consume the client and return the link.
    pub fn into_inner(self) -> L {
        self.writer.into_inner()
    }
}

fn with_units(msg: Message, units: Option<&str>) -> Message {
    match units {
        Some(units) => msg.with_units(units),
        None => msg,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use bytes::BytesMut;
    use orp_frame::{at, FrameDecoder, Framing};
    use orp_protocol::{status, MAX_DATA_LEN, MAX_PATH_LEN, MAX_UNITS_LEN};

    use super::*;
    use crate::file::tests::SharedSink;

    /// Link that replays `inbound` and records everything written.
    #[derive(Default)]
    struct Loopback {
        inbound: Cursor<Vec<u8>>,
        outbound: Vec<u8>,
        failing_writes: usize,
    }

    impl Loopback {
        fn with_inbound(bytes: Vec<u8>) -> Self {
            Self {
                inbound: Cursor::new(bytes),
                ..Self::default()
            }
        }
    }

    impl Read for Loopback {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inbound.read(buf)
        }
    }

    impl Write for Loopback {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failing_writes > 0 {
                self.failing_writes -= 1;
                return Err(io::Error::other("link glitch"));
            }
            self.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn sent_messages(client: &OrpClient<Loopback>) -> Vec<Message> {
        let codec = PacketCodec::default();
        let mut wire = BytesMut::from(client.get_ref().outbound.as_slice());
        let mut decoder = FrameDecoder::default();
        let mut out = Vec::new();
        while let Some(packet) = decoder.decode(&mut wire).unwrap() {
            out.push(codec.decode(&packet).unwrap());
        }
        out
    }

    fn framed(msg: &Message) -> Vec<u8> {
        let packet = PacketCodec::default().encode_to_bytes(msg).unwrap();
        orp_frame::frame_to_vec(&packet)
    }

    #[test]
    fn requests_are_numbered_in_order() {
        let mut client = OrpClient::new(Loopback::default());
        assert_eq!(client.create_input("/app/in", DataType::Numeric, Some("degC")).unwrap(), 0);
        assert_eq!(client.get("/app/in").unwrap(), 1);
        assert_eq!(client.delete("/app/in").unwrap(), 2);

        let sent = sent_messages(&client);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].packet_type, PacketType::InputCreateRequest);
        assert_eq!(sent[0].units.as_deref(), Some("degC"));
        assert_eq!(sent[1].sequence, 1);
        assert_eq!(sent[2].packet_type, PacketType::DeleteRequest);
        assert_eq!(client.sent(), 3);
    }

    #[test]
    fn push_carries_value_and_timestamp() {
        let mut client = OrpClient::new(Loopback::default());
        client
            .push("/app/sensor/value", DataType::Numeric, 12345.0, Some("3.14"))
            .unwrap();
        client
            .push("/app/button", DataType::Trigger, 1.5, None)
            .unwrap();

        let sent = sent_messages(&client);
        assert_eq!(sent[0].data_str(), Some("3.14"));
        assert_eq!(sent[0].timestamp, Some(12345.0));
        assert_eq!(sent[1].data, None);
        assert_eq!(sent[1].data_type, Some(DataType::Trigger));
    }

    #[test]
    fn sequence_wraps() {
        let mut client = OrpClient::new(Loopback::default());
        client.sequence = u16::MAX;
        assert_eq!(client.get("/a").unwrap(), u16::MAX);
        assert_eq!(client.get("/a").unwrap(), 0);
    }

    #[test]
    fn json_example_must_parse() {
        let mut client = OrpClient::new(Loopback::default());
        let err = client.set_json_example("/app/cfg", "{not json").unwrap_err();
        assert!(matches!(err, ClientError::Json(_)));
        assert!(client.get_ref().outbound.is_empty());

        client.set_json_example("/app/cfg", r#"{"x":1}"#).unwrap();
        let sent = sent_messages(&client);
        assert_eq!(sent[0].data_type, Some(DataType::Json));
        assert_eq!(sent[0].data_str(), Some(r#"{"x":1}"#));
    }

    #[test]
    fn respond_rejects_request_types() {
        let mut client = OrpClient::new(Loopback::default());
        let err = client
            .respond(PacketType::PushResponse, status::OK, 0)
            .unwrap_err();
        assert!(matches!(err, ClientError::BadParameter(PacketType::PushResponse)));

        client
            .respond(PacketType::HandlerCallResponse, status::OK, 9)
            .unwrap();
        let sent = sent_messages(&client);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].sequence, 9);
        assert!(sent[0].is_ok());
    }

    #[test]
    fn sync_reports_counts_and_mtu() {
        let config = ClientConfig {
            mtu: Some(1024),
            ..ClientConfig::default()
        };
        let inbound = framed(&Message::new(PacketType::GetRequest).with_path("/x"));
        let mut client = OrpClient::with_config(Loopback::with_inbound(inbound), config);
        let mut out = Vec::new();
        client.poll(&mut out).unwrap();
        client.get("/app/a").unwrap();

        client.sync(PacketType::SyncSyn).unwrap();
        let sent = sent_messages(&client);
        let syn = &sent[1];
        assert_eq!(syn.packet_type, PacketType::SyncSyn);
        assert_eq!(syn.version, Some(1));
        assert_eq!(syn.sent_count, Some(1));
        assert_eq!(syn.received_count, Some(1));
        assert_eq!(syn.mtu, Some(1024));

        let err = client.sync(PacketType::GetRequest).unwrap_err();
        assert!(matches!(err, ClientError::BadParameter(_)));
    }

    #[test]
    fn file_notify_sends_event_and_control_data() {
        let mut client = OrpClient::new(Loopback::default());
        client
            .file_notify(FileEvent::Ready, Some("firmware.bin,1024"))
            .unwrap();
        client.file_data(Bytes::from_static(b"\x00\x7e\x7d")).unwrap();

        let sent = sent_messages(&client);
        assert_eq!(sent[0].event, Some(FileEvent::Ready));
        assert_eq!(sent[0].data_str(), Some("firmware.bin,1024"));
        assert_eq!(sent[1].data.as_deref(), Some(&b"\x00\x7e\x7d"[..]));
    }

    #[test]
    fn poll_sends_auto_acks() {
        let mut inbound = framed(&Message::new(PacketType::FileDataRequest)
            .with_sequence(40)
            .with_data("part-1"));
        inbound.extend(framed(&Message::new(PacketType::FileDataRequest)
            .with_sequence(41)
            .with_data("part-2")));

        let sink = SharedSink::default();
        let mut client = OrpClient::new(Loopback::with_inbound(inbound));
        client.receive_file(Box::new(sink.clone()), Some(12), true);

        let mut out = Vec::new();
        assert_eq!(client.poll(&mut out).unwrap(), 2);
        assert_eq!(sink.contents(), b"part-1part-2");

        let acks = sent_messages(&client);
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].packet_type, PacketType::FileDataResponse);
        assert_eq!(acks[0].sequence, 40);
        assert_eq!(acks[1].sequence, 41);
        assert!(!client.pipeline().files().is_auto());
    }

    #[test]
    fn failed_ack_write_keeps_remaining_acks_queued() {
        let mut inbound = framed(&Message::new(PacketType::FileDataRequest)
            .with_sequence(10)
            .with_data("part-1"));
        inbound.extend(framed(&Message::new(PacketType::FileDataRequest)
            .with_sequence(11)
            .with_data("part-2")));

        let sink = SharedSink::default();
        let mut link = Loopback::with_inbound(inbound);
        link.failing_writes = 1;
        let mut client = OrpClient::new(link);
        client.receive_file(Box::new(sink.clone()), None, true);

        let mut out = Vec::new();
        let err = client.poll(&mut out).unwrap_err();
        assert!(matches!(err, ClientError::Frame(FrameError::Io(_))));
        assert_eq!(sink.contents(), b"part-1part-2");
        assert_eq!(client.pipeline().pending_acks(), 2);
        assert!(client.get_ref().outbound.is_empty());

        client.send_acks().unwrap();
        assert_eq!(client.pipeline().pending_acks(), 0);
        let sequences: Vec<u16> = sent_messages(&client)
            .iter()
            .map(|ack| ack.sequence)
            .collect();
        assert_eq!(sequences, vec![10, 11]);
        assert_eq!(client.sent(), 2);
    }

    #[test]
    fn largest_packet_is_sent_and_received() {
        let msg = Message::new(PacketType::ExampleSetRequest)
            .with_data_type(DataType::Json)
            .with_timestamp(1234567890.123456)
            .with_path(format!("/{}", "p".repeat(MAX_PATH_LEN - 1)))
            .with_units("u".repeat(MAX_UNITS_LEN))
            .with_data(vec![b'd'; MAX_DATA_LEN]);

        let mut client = OrpClient::new(Loopback::default());
        client.send(&msg).unwrap();
        let wire = client.into_inner().outbound;

        let mut client = OrpClient::new(Loopback::with_inbound(wire));
        let mut out = Vec::new();
        while out.is_empty() {
            client.poll(&mut out).unwrap();
        }
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn manual_ack_flushes_held_chunk() {
        let inbound = framed(&Message::new(PacketType::FileDataRequest)
            .with_sequence(3)
            .with_data("held"));
        let sink = SharedSink::default();
        let mut client = OrpClient::new(Loopback::with_inbound(inbound));
        client.receive_file(Box::new(sink.clone()), None, false);

        let mut out = Vec::new();
        client.poll(&mut out).unwrap();
        assert!(sink.contents().is_empty());
        assert!(client.get_ref().outbound.is_empty());

        client
            .respond(PacketType::FileDataResponse, status::OK, out[0].sequence)
            .unwrap();
        assert_eq!(sink.contents(), b"held");
    }

    #[test]
    fn poll_reports_closed_link() {
        let mut client = OrpClient::new(Loopback::default());
        let mut out = Vec::new();
        let err = client.poll(&mut out).unwrap_err();
        assert!(matches!(err, ClientError::Frame(FrameError::ConnectionClosed)));
    }

    #[test]
    fn oversized_packet_is_refused_before_writing() {
        let config = ClientConfig {
            max_packet_size: 32,
            ..ClientConfig::default()
        };
        let mut client = OrpClient::with_config(Loopback::default(), config);
        let err = client
            .push("/app/sensor/value", DataType::String, 1.0, Some(&"x".repeat(64)))
            .unwrap_err();
        assert!(matches!(err, ClientError::PacketTooLarge { max: 32, .. }));
        assert!(client.get_ref().outbound.is_empty());
        assert_eq!(client.sent(), 0);
    }

    #[test]
    fn at_framing_writes_command_lines() {
        let config = ClientConfig {
            framing: Framing::At,
            ..ClientConfig::default()
        };
        let mut client = OrpClient::with_config(Loopback::default(), config);
        client.get("/app/value").unwrap();

        let packet = PacketCodec::default()
            .encode_to_bytes(&Message::new(PacketType::GetRequest).with_path("/app/value"))
            .unwrap();
        let mut expected = vec![0u8; at::command_len(&packet)];
        at::pack(&packet, &mut expected).unwrap();
        assert_eq!(client.get_ref().outbound, expected);
        assert!(client.get_ref().outbound.starts_with(b"AT+ORP=\"G0"));
    }
}
