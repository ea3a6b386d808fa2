use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use orp_client::{ClientConfig, ClientError, Dispatch, OrpClient};
use orp_frame::Framing;
use orp_protocol::Message;
use tracing::{debug, info};

use crate::cmd::SendArgs;
use crate::exit::{client_error, io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, print_text, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let msg = args.message.build()?;

    let link = open_device(&args.device)?;
    let config = ClientConfig {
        framing: if args.at { Framing::At } else { Framing::Hdlc },
        ..ClientConfig::default()
    };
    let mut client = OrpClient::with_config(link, config);
    client
        .send(&msg)
        .map_err(|err| client_error("send failed", err))?;
    info!(
        packet_type = %msg.packet_type,
        sequence = msg.sequence,
        device = %args.device.display(),
        "message sent"
    );

    if args.wait {
        match wait_for_response(client, msg, wait_timeout)? {
            Reply::Message(reply) => print_message(&reply, format),
            Reply::Text(line) => print_text(&line, format),
        }
    }

    Ok(SUCCESS)
}

pub(crate) fn open_device(path: &Path) -> CliResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))
}

#[derive(Debug)]
enum Reply {
    Message(Message),
    Text(String),
}

/// Waits for the reply to one request.
struct Waiter {
    request: Message,
    reply: Option<Reply>,
}

impl Dispatch for Waiter {
    fn dispatch(&mut self, message: Message) {
        if self.reply.is_none() && answers(&self.request, &message) {
            self.reply = Some(Reply::Message(message));
        } else {
            debug!(packet_type = %message.packet_type, "ignoring unrelated message");
        }
    }

    fn text(&mut self, line: &str) {
        if self.reply.is_none() {
            self.reply = Some(Reply::Text(line.to_string()));
        }
    }
}

/// Whether `reply` answers `request`: a sync packet answers a sync packet,
/// otherwise a response with the same sequence number.
fn answers(request: &Message, reply: &Message) -> bool {
    if request.packet_type.is_sync() {
        return reply.packet_type.is_sync();
    }
    reply.packet_type.is_response() && reply.sequence == request.sequence
}

fn wait_for_response(
    mut client: OrpClient<File>,
    request: Message,
    timeout: Duration,
) -> CliResult<Reply> {
    let (tx, rx) = mpsc::channel::<Result<Reply, ClientError>>();

    // A blocking device read cannot be interrupted; the reader thread is left
    // behind on timeout and ends with the process.
    thread::spawn(move || {
        let mut waiter = Waiter {
            request,
            reply: None,
        };
        let outcome = loop {
            if let Err(err) = client.poll(&mut waiter) {
                break Err(err);
            }
            if let Some(reply) = waiter.reply.take() {
                break Ok(reply);
            }
        };
        let _ = tx.send(outcome);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(err)) => Err(client_error("receive failed", err)),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("no response within {timeout:?}"),
        )),
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
