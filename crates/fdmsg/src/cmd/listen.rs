use fdmsg_channel::{ChannelTransport, ReceiveOutcome};
use fdmsg_transport::Listener;

use crate::cmd::ListenArgs;
use crate::exit::{channel_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener =
        Listener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    let stream = listener
        .accept()
        .map_err(|err| transport_error("accept failed", err))?;
    let mut channel =
        ChannelTransport::new(stream).map_err(|err| channel_error("channel setup failed", err))?;

    let mut seen = 0usize;
    loop {
        while let Some(msg) = channel
            .parse_next()
            .map_err(|err| channel_error("parse failed", err))?
        {
            print_message(&msg, format);
            seen += 1;
            if args.count.is_some_and(|count| seen >= count) {
                return Ok(SUCCESS);
            }
        }
        match channel
            .receive_once()
            .map_err(|err| channel_error("receive failed", err))?
        {
            ReceiveOutcome::Progressed(_) => {}
            ReceiveOutcome::Closed => return Ok(SUCCESS),
            // Blocking socket; a spurious wakeup just means try again.
            ReceiveOutcome::WouldBlock => {}
        }
    }
}
