use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Args, Subcommand};
use orp_protocol::{status, DataType, FileEvent, Message, PacketType, ProtocolVersion};

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a message and print its encoded bytes as hex.
    Encode(EncodeArgs),
    /// Decode hex frames and print the messages.
    Decode(DecodeArgs),
    /// Send a single message over a serial device.
    Send(SendArgs),
    /// Print messages received from a serial device.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Fields of the message to build.
#[derive(Args, Debug)]
pub struct MessageArgs {
    /// Packet kind (push, get, sensor-create, sync-syn, file-control, ...).
    #[arg(value_parser = parse_kind)]
    pub kind: PacketType,
    /// Resource path.
    #[arg(long, short = 'p')]
    pub path: Option<String>,
    /// Data type: trigger, boolean, numeric, string or json.
    #[arg(long, short = 't', value_parser = parse_data_type)]
    pub data_type: Option<DataType>,
    /// Units.
    #[arg(long, short = 'u')]
    pub units: Option<String>,
    /// Timestamp in seconds since the epoch, or `now`.
    #[arg(long)]
    pub timestamp: Option<String>,
    /// Data value.
    #[arg(long, short = 'd')]
    pub data: Option<String>,
    /// Response status, a number (0, -1, ...) or a name (OK, NOT_FOUND, ...).
    #[arg(long, allow_hyphen_values = true, value_parser = parse_status)]
    pub status: Option<i32>,
    /// File control event: info, ready, pending, start, suspend, resume, complete or abort.
    #[arg(long, value_parser = parse_event)]
    pub event: Option<FileEvent>,
    /// Protocol version carried by sync packets.
    #[arg(long)]
    pub protocol_version: Option<u8>,
    /// Sequence number.
    #[arg(long, default_value_t = 0)]
    pub sequence: u16,
    /// Sent count (sync packets).
    #[arg(long)]
    pub sent: Option<u32>,
    /// Received count (sync packets).
    #[arg(long)]
    pub received: Option<u32>,
    /// MTU (sync packets).
    #[arg(long)]
    pub mtu: Option<u32>,
}

impl MessageArgs {
    pub fn build(&self) -> CliResult<Message> {
        let mut msg = Message::new(self.kind).with_sequence(self.sequence);
        msg.path = self.path.clone();
        msg.data_type = self.data_type;
        msg.units = self.units.clone();
        msg.status = self.status;
        msg.event = self.event;
        msg.version = self.protocol_version;
        msg.sent_count = self.sent;
        msg.received_count = self.received;
        msg.mtu = self.mtu;
        if let Some(data) = &self.data {
            msg = msg.with_data(data.clone());
        }
        if let Some(timestamp) = &self.timestamp {
            msg.timestamp = Some(parse_timestamp(timestamp)?);
        }

        if msg.packet_type.is_sync() && msg.version.is_none() {
            msg.version = Some(ProtocolVersion::default().number());
        }
        if msg.packet_type.is_response() && msg.status.is_none() {
            msg.status = Some(status::OK);
        }
        Ok(msg)
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub message: MessageArgs,
    /// Wrap as an AT+ORP command line instead of an HDLC frame.
    #[arg(long, conflicts_with = "raw")]
    pub at: bool,
    /// Print the unframed packet.
    #[arg(long, conflicts_with = "at")]
    pub raw: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex text of one or more frames; separate arguments are joined.
    #[arg(required = true)]
    pub hex: Vec<String>,
    /// Input is a single unframed packet.
    #[arg(long)]
    pub packet: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Serial device (or any readable and writable path).
    pub device: PathBuf,
    #[command(flatten)]
    pub message: MessageArgs,
    /// Use AT command framing.
    #[arg(long)]
    pub at: bool,
    /// Wait for the response and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Serial device (or any readable path).
    #[arg(env = "ORP_DEVICE")]
    pub device: PathBuf,
    /// Use AT command framing.
    #[arg(long)]
    pub at: bool,
    /// Acknowledge file data as it arrives.
    #[arg(long)]
    pub auto_ack: bool,
    /// Store received file data in FILE.
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,
    /// Expected file size in bytes; auto acknowledgement stops once reached.
    #[arg(long, requires = "save")]
    pub size: Option<u64>,
    /// Send a sync packet before listening.
    #[arg(long)]
    pub sync: bool,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

fn parse_kind(value: &str) -> Result<PacketType, String> {
    if let Some(packet_type) = PacketType::from_name(value) {
        return Ok(packet_type);
    }
    let mut bytes = value.bytes();
    if let (Some(byte), None) = (bytes.next(), bytes.next()) {
        if let Some(packet_type) = PacketType::from_wire(byte) {
            return Ok(packet_type);
        }
    }
    Err(format!("unknown packet kind '{value}'"))
}

fn parse_data_type(value: &str) -> Result<DataType, String> {
    DataType::ALL
        .into_iter()
        .find(|data_type| data_type.name().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown data type '{value}'"))
}

fn parse_event(value: &str) -> Result<FileEvent, String> {
    FileEvent::ALL
        .into_iter()
        .find(|event| event.name().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown file event '{value}'"))
}

fn parse_status(value: &str) -> Result<i32, String> {
    if let Ok(code) = value.parse::<i32>() {
        return status::to_wire(code)
            .map(|_| code)
            .ok_or_else(|| format!("status {code} out of range"));
    }
    (status::SUSPENDED..=status::OK)
        .find(|&code| status::name(code).is_some_and(|name| name.eq_ignore_ascii_case(value)))
        .ok_or_else(|| format!("unknown status '{value}'"))
}

fn parse_timestamp(value: &str) -> CliResult<f64> {
    if value.eq_ignore_ascii_case("now") {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| CliError::new(crate::exit::INTERNAL, format!("clock error: {err}")))?;
        // Millisecond resolution.
        return Ok((now.as_millis() as f64) / 1000.0);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .ok_or_else(|| CliError::usage(format!("invalid timestamp '{value}'")))
}
