use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use pipeduplex_channel::Channel;

use crate::cmd::{event_channel, forwarding_handlers, parse_duration, Event, SendArgs};
use crate::exit::{channel_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let (tx, rx) = event_channel();
    let channel = args.channel.open(forwarding_handlers(tx))?;

    let outcome = send_all(&channel, &args.data).and_then(|()| {
        if !args.wait {
            return Ok(());
        }
        let reply = wait_for_reply(&rx, wait_timeout)?;
        print_message(channel.role(), &reply, format);
        Ok(())
    });

    channel.close();
    outcome.map(|()| SUCCESS)
}

fn send_all(channel: &Channel, messages: &[String]) -> CliResult<()> {
    for (index, message) in messages.iter().enumerate() {
        channel
            .try_send(message)
            .map_err(|err| channel_error(&format!("message {} not sent", index + 1), err))?;
        tracing::debug!(index, size = message.len(), "message sent");
    }
    tracing::info!(count = messages.len(), role = %channel.role(), "all messages sent");
    Ok(())
}

fn wait_for_reply(rx: &Receiver<Event>, timeout: Duration) -> CliResult<String> {
    loop {
        match rx.recv_timeout(timeout) {
            Ok(Event::Message(line)) => return Ok(line),
            Ok(Event::PeerGone) | Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(FAILURE, "peer disconnected before replying"))
            }
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no reply within {timeout:?}"),
                ))
            }
        }
    }
}
