#![cfg(unix)]

use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use orp_client::{ClientConfig, OrpClient};
use orp_frame::{encode_frame, FrameReader};
use orp_protocol::{status, DataType, Message, PacketCodec, PacketType};

/// Plays the module side of the link: frames `messages` and writes them in
/// pieces of `piece` bytes with a short pause in between.
fn module_writes(mut link: UnixStream, messages: Vec<Message>, piece: usize) -> UnixStream {
    use std::io::Write;

    let codec = PacketCodec::default();
    let mut wire = BytesMut::new();
    for msg in &messages {
        encode_frame(&codec.encode_to_bytes(msg).unwrap(), &mut wire).unwrap();
    }
    for chunk in wire.chunks(piece) {
        link.write_all(chunk).unwrap();
        thread::sleep(Duration::from_millis(2));
    }
    link
}

fn poll_until(client: &mut OrpClient<UnixStream>, out: &mut Vec<Message>, count: usize) {
    while out.len() < count {
        client.poll(out).unwrap();
    }
}

#[test]
fn push_notification_arrives_in_pieces() {
    let (client_side, module_side) = UnixStream::pair().unwrap();
    let push = Message::new(PacketType::PushRequest)
        .with_data_type(DataType::Numeric)
        .with_timestamp(12345.0)
        .with_path("/app/sensor/value")
        .with_data("3.14");

    let expected = push.clone();
    let module = thread::spawn(move || module_writes(module_side, vec![push], 11));

    let mut client = OrpClient::new(client_side);
    let mut out = Vec::new();
    poll_until(&mut client, &mut out, 1);
    module.join().unwrap();

    assert_eq!(out, vec![expected]);
    assert_eq!(client.received(), 1);
}

#[test]
fn request_reaches_module_and_response_returns() {
    let (client_side, module_side) = UnixStream::pair().unwrap();
    let mut client = OrpClient::new(client_side);
    let sequence = client.create_sensor("/app/temp", DataType::Numeric, Some("degC")).unwrap();

    let module = thread::spawn(move || {
        let codec = PacketCodec::default();
        let mut reader = FrameReader::new(module_side.try_clone().unwrap());
        let request = codec.decode(&reader.read_frame().unwrap()).unwrap();
        assert_eq!(request.packet_type, PacketType::SensorCreateRequest);
        assert_eq!(request.path.as_deref(), Some("/app/temp"));
        assert_eq!(request.units.as_deref(), Some("degC"));

        let response = Message::response(PacketType::SensorCreateResponse, status::OK)
            .with_sequence(request.sequence);
        module_writes(module_side, vec![response], 64)
    });

    let mut out = Vec::new();
    poll_until(&mut client, &mut out, 1);
    module.join().unwrap();

    assert_eq!(out[0].packet_type, PacketType::SensorCreateResponse);
    assert_eq!(out[0].sequence, sequence);
    assert!(out[0].is_ok());
}

#[test]
fn file_transfer_with_auto_ack() {
    let (client_side, module_side) = UnixStream::pair().unwrap();
    let chunks: Vec<Message> = [&b"\x7e\x7d\x00"[..], b",,D", b"end"]
        .iter()
        .enumerate()
        .map(|(i, data)| {
            Message::new(PacketType::FileDataRequest)
                .with_sequence(100 + i as u16)
                .with_data(data.to_vec())
        })
        .collect();

    let config = ClientConfig {
        auto_ack: true,
        ..ClientConfig::default()
    };
    let mut client = OrpClient::with_config(client_side, config);
    let received = Arc::new(Mutex::new(Vec::new()));
    client.receive_file(Box::new(SharedVec(received.clone())), Some(9), true);

    let module = thread::spawn(move || {
        let link = module_writes(module_side, chunks, 5);
        let codec = PacketCodec::default();
        let mut reader = FrameReader::new(link);
        (0..3)
            .map(|_| codec.decode(&reader.read_frame().unwrap()).unwrap())
            .collect::<Vec<_>>()
    });

    let mut out = Vec::new();
    poll_until(&mut client, &mut out, 3);
    let acks = module.join().unwrap();

    assert_eq!(received.lock().unwrap().as_slice(), b"\x7e\x7d\x00,,Dend");
    let sequences: Vec<u16> = acks.iter().map(|ack| ack.sequence).collect();
    assert_eq!(sequences, vec![100, 101, 102]);
    assert!(acks
        .iter()
        .all(|ack| ack.packet_type == PacketType::FileDataResponse && ack.is_ok()));
}

struct SharedVec(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedVec {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
