use crate::cmd::{event_channel, forward_ctrlc, forwarding_handlers, Event, ListenArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let (tx, rx) = event_channel();
    forward_ctrlc(tx.clone())?;
    let channel = args.channel.open(forwarding_handlers(tx))?;
    let role = channel.role();

    let mut printed = 0usize;
    while let Ok(event) = rx.recv() {
        match event {
            Event::Message(line) => {
                print_message(role, &line, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Event::PeerGone => {
                tracing::info!(received = printed, "peer disconnected");
                break;
            }
            Event::Interrupted => {
                tracing::info!(received = printed, "interrupted");
                break;
            }
            Event::Input(_) | Event::InputClosed => {}
        }
    }

    channel.close();
    Ok(SUCCESS)
}
