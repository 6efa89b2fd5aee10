use std::fs::{self, File};
use std::os::fd::OwnedFd;

use fdmsg_channel::ChannelTransport;

use crate::cmd::SendArgs;
use crate::exit::{channel_error, io_error, transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: SendArgs, _format: OutputFormat) -> CliResult<i32> {
    let stream = fdmsg_transport::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut channel =
        ChannelTransport::new(stream).map_err(|err| channel_error("channel setup failed", err))?;

    let payload = resolve_payload(&args)?;
    let descriptor = match &args.attach {
        Some(path) => {
            let file = File::open(path).map_err(|err| {
                io_error(&format!("failed opening {} for --attach", path.display()), err)
            })?;
            Some(OwnedFd::from(file))
        }
        None => None,
    };

    channel
        .compose(args.msg_type, args.peer_id, 0, descriptor, &payload)
        .map_err(|err| channel_error("compose failed", err))?;
    channel
        .flush()
        .map_err(|err| channel_error("send failed", err))?;

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
