use orp_client::{ClientConfig, ClientError, Dispatch, ReceivePipeline};
use orp_protocol::{Message, PacketCodec};

use crate::cmd::DecodeArgs;
use crate::exit::{codec_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_message, OutputFormat};

#[derive(Default)]
struct Collected {
    messages: Vec<Message>,
    errors: Vec<String>,
}

impl Dispatch for Collected {
    fn dispatch(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn rejected(&mut self, error: &ClientError) {
        self.errors.push(error.to_string());
    }
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex.join(" "))
        .map_err(|err| CliError::usage(format!("invalid hex input: {err}")))?;

    if args.packet {
        let msg = PacketCodec::default()
            .decode(&bytes)
            .map_err(|err| codec_error("decode failed", err))?;
        print_message(&msg, format);
        return Ok(SUCCESS);
    }

    let collected = decode_frames(&bytes);
    for msg in &collected.messages {
        print_message(msg, format);
    }

    if let Some(first) = collected.errors.first() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} frame(s) rejected: {first}", collected.errors.len()),
        ));
    }
    if collected.messages.is_empty() {
        return Err(CliError::new(DATA_INVALID, "no complete frame in input"));
    }
    Ok(SUCCESS)
}

/// Hex text with whitespace, `:` and `-` separators and `0x` prefixes removed.
fn parse_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits: String = text
        .split(|c: char| c.is_whitespace() || c == ':' || c == '-')
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();
    hex::decode(digits)
}

fn decode_frames(bytes: &[u8]) -> Collected {
    let mut pipeline = ReceivePipeline::new(&ClientConfig::default());
    let mut collected = Collected::default();
    pipeline.feed(bytes, &mut collected);
    collected
}
