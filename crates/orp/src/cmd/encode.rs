use orp_frame::{at, frame_to_vec};
use orp_protocol::PacketCodec;

use crate::cmd::EncodeArgs;
use crate::exit::{codec_error, frame_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let msg = args.message.build()?;
    let packet = PacketCodec::default()
        .encode_to_bytes(&msg)
        .map_err(|err| codec_error("encode failed", err))?;

    let (framing, bytes) = if args.raw {
        ("packet", packet.to_vec())
    } else if args.at {
        let mut line = vec![0u8; at::command_len(&packet)];
        let len = at::pack(&packet, &mut line).map_err(|err| frame_error("encode failed", err))?;
        line.truncate(len);
        ("at", line)
    } else {
        ("hdlc", frame_to_vec(&packet))
    };

    print_encoded(msg.packet_type, framing, &bytes, format);
    Ok(SUCCESS)
}
