use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use orp_protocol::{status, HeaderByte, Message, PacketType};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    packet_type: &'a str,
    wire: String,
    sequence: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    units: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sent_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    received_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtu: Option<u32>,
}

impl<'a> MessageOutput<'a> {
    fn new(msg: &'a Message) -> Self {
        Self {
            packet_type: msg.packet_type.name(),
            wire: char::from(msg.packet_type.wire()).to_string(),
            sequence: msg.sequence,
            data_type: msg.data_type.map(|data_type| data_type.name()),
            status: msg.status,
            status_name: msg.status.and_then(status::name),
            version: msg.version,
            event: msg.event.map(|event| event.name()),
            timestamp: msg.timestamp,
            path: msg.path.as_deref(),
            units: msg.units.as_deref(),
            data: msg.data.as_deref().map(|data| payload_preview(msg.packet_type, data)),
            data_size: msg.data.as_ref().map(|data| data.len()),
            sent_count: msg.sent_count,
            received_count: msg.received_count,
            mtu: msg.mtu,
        }
    }
}

pub fn print_message(msg: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput::new(msg);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "SEQ", "HEADER", "PATH", "DATA"])
                .add_row(vec![
                    msg.packet_type.name().to_string(),
                    msg.sequence.to_string(),
                    header_summary(msg),
                    msg.path.clone().unwrap_or_default(),
                    data_summary(msg),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!(
                "{} ({}) seq={}",
                msg.packet_type.name(),
                char::from(msg.packet_type.wire()),
                msg.sequence
            );
            let header = header_summary(msg);
            if !header.is_empty() {
                line.push_str(&format!(" [{header}]"));
            }
            if let Some(timestamp) = msg.timestamp {
                line.push_str(&format!(" time={timestamp}"));
            }
            if let Some(path) = &msg.path {
                line.push_str(&format!(" path={path}"));
            }
            if let Some(units) = &msg.units {
                line.push_str(&format!(" units={units}"));
            }
            if msg.data.is_some() {
                line.push_str(&format!(" data={}", data_summary(msg)));
            }
            if let Some(sent) = msg.sent_count {
                line.push_str(&format!(" sent={sent}"));
            }
            if let Some(received) = msg.received_count {
                line.push_str(&format!(" received={received}"));
            }
            if let Some(mtu) = msg.mtu {
                line.push_str(&format!(" mtu={mtu}"));
            }
            println!("{line}");
        }
        OutputFormat::Raw => {
            print_raw(msg.data.as_deref().unwrap_or_default());
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    packet_type: &'a str,
    framing: &'a str,
    len: usize,
    hex: String,
}

/// Print encoded bytes, as hex unless the format is raw.
pub fn print_encoded(packet_type: PacketType, framing: &str, bytes: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EncodedOutput {
                packet_type: packet_type.name(),
                framing,
                len: bytes.len(),
                hex: hex::encode(bytes),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "FRAMING", "LEN", "HEX"])
                .add_row(vec![
                    packet_type.name().to_string(),
                    framing.to_string(),
                    bytes.len().to_string(),
                    hex::encode(bytes),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{}", hex::encode(bytes));
        }
        OutputFormat::Raw => print_raw(bytes),
    }
}

#[derive(Serialize)]
struct TextOutput<'a> {
    line: &'a str,
}

/// Print a text line from the modem.
pub fn print_text(line: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&TextOutput { line }).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Raw => {
            print_raw(line.as_bytes());
            print_raw(b"\n");
        }
        OutputFormat::Table | OutputFormat::Pretty => println!("{line}"),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// What header byte 1 carries, rendered for humans.
pub fn header_summary(msg: &Message) -> String {
    match msg.packet_type.header_byte() {
        HeaderByte::Status => match msg.status {
            Some(code) => match status::name(code) {
                Some(name) => name.to_string(),
                None => code.to_string(),
            },
            None => String::new(),
        },
        HeaderByte::DataType => msg
            .data_type
            .map(|data_type| data_type.name().to_string())
            .unwrap_or_default(),
        HeaderByte::Version => msg
            .version
            .map(|version| format!("v{version}"))
            .unwrap_or_default(),
        HeaderByte::Event => msg
            .event
            .map(|event| event.name().to_string())
            .unwrap_or_default(),
        HeaderByte::Pad => String::new(),
    }
}

fn data_summary(msg: &Message) -> String {
    msg.data
        .as_deref()
        .map(|data| payload_preview(msg.packet_type, data))
        .unwrap_or_default()
}

/// File data is binary by nature and never shown as text.
fn payload_preview(packet_type: PacketType, payload: &[u8]) -> String {
    if packet_type == PacketType::FileDataRequest {
        return format!("<file data {} bytes>", payload.len());
    }
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use orp_protocol::{DataType, FileEvent};

    use super::*;

    #[test]
    fn header_summary_follows_packet_table() {
        let push = Message::new(PacketType::PushRequest).with_data_type(DataType::Numeric);
        assert_eq!(header_summary(&push), "numeric");

        let resp = Message::response(PacketType::GetResponse, status::NOT_FOUND);
        assert_eq!(header_summary(&resp), "NOT_FOUND");

        let syn = Message::new(PacketType::SyncSyn).with_version(1);
        assert_eq!(header_summary(&syn), "v1");

        let ready = Message::new(PacketType::FileControlNotify).with_event(FileEvent::Ready);
        assert_eq!(header_summary(&ready), "ready");

        assert_eq!(header_summary(&Message::new(PacketType::GetRequest)), "");
    }

    #[test]
    fn json_output_skips_absent_fields() {
        let msg = Message::new(PacketType::GetRequest)
            .with_path("/app/value")
            .with_sequence(3);
        let json = serde_json::to_value(MessageOutput::new(&msg)).unwrap();

        assert_eq!(json["packet_type"], "get");
        assert_eq!(json["wire"], "G");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["path"], "/app/value");
        assert!(json.get("data").is_none());
        assert!(json.get("status").is_none());
    }

    #[test]
    fn file_data_is_not_printed_as_text() {
        let msg = Message::new(PacketType::FileDataRequest).with_data("plain");
        assert_eq!(data_summary(&msg), "<file data 5 bytes>");
    }
}
