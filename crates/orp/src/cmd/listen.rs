use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use orp_client::{ClientConfig, ClientError, Dispatch, OrpClient};
use orp_frame::{FrameError, Framing};
use orp_protocol::{Message, PacketType};
use tracing::{info, warn};

use crate::cmd::send::open_device;
use crate::cmd::ListenArgs;
use crate::exit::{client_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, print_text, OutputFormat};

/// Prints everything the pipeline hands over.
struct Printer {
    format: OutputFormat,
    printed: usize,
    rejected: usize,
}

impl Dispatch for Printer {
    fn dispatch(&mut self, message: Message) {
        print_message(&message, self.format);
        self.printed = self.printed.saturating_add(1);
    }

    fn rejected(&mut self, error: &ClientError) {
        warn!(error = %error, "frame rejected");
        self.rejected = self.rejected.saturating_add(1);
    }

    fn text(&mut self, line: &str) {
        print_text(line, self.format);
        self.printed = self.printed.saturating_add(1);
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let link = open_device(&args.device)?;
    let config = ClientConfig {
        framing: if args.at { Framing::At } else { Framing::Hdlc },
        auto_ack: args.auto_ack,
        ..ClientConfig::default()
    };
    let mut client = OrpClient::with_config(link, config);

    if let Some(path) = &args.save {
        let file = File::create(path)
            .map_err(|err| io_error(&format!("failed creating {}", path.display()), err))?;
        client.receive_file(Box::new(file), args.size, args.auto_ack);
        info!(path = %path.display(), size = ?args.size, "saving file data");
    } else if args.auto_ack {
        client.receive_file(Box::new(std::io::sink()), None, true);
    }

    if args.sync {
        client
            .sync(PacketType::SyncSyn)
            .map_err(|err| client_error("sync failed", err))?;
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printer = Printer {
        format,
        printed: 0,
        rejected: 0,
    };

    while running.load(Ordering::SeqCst) {
        match client.poll(&mut printer) {
            Ok(_) => {}
            Err(ClientError::Frame(FrameError::ConnectionClosed)) => break,
            Err(err) => return Err(client_error("receive failed", err)),
        }

        if let Some(count) = args.count {
            if printer.printed >= count {
                break;
            }
        }
    }

    info!(
        received = client.received(),
        sent = client.sent(),
        rejected = printer.rejected,
        "listen finished"
    );
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
