use std::sync::mpsc::Sender;

use pipeduplex_channel::{ChannelHandlers, Confirm};

use crate::cmd::{event_channel, forward_ctrlc, EchoArgs, Event};
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let (tx, rx) = event_channel();
    forward_ctrlc(tx.clone())?;
    let channel = args.channel.open(echo_handlers(tx))?;

    let mut echoed = 0usize;
    while let Ok(event) = rx.recv() {
        match event {
            Event::Message(_) => echoed = echoed.saturating_add(1),
            Event::PeerGone | Event::Interrupted => break,
            Event::Input(_) | Event::InputClosed => {}
        }
    }

    tracing::info!(echoed, "echo finished");
    channel.close();
    Ok(SUCCESS)
}

/// Reply to every message on the receive thread; report each one to `tx`.
fn echo_handlers(tx: Sender<Event>) -> ChannelHandlers {
    let on_gone = tx.clone();
    ChannelHandlers::new(move |channel, line| {
        let confirm = channel.send(line);
        tracing::info!(size = line.len(), %confirm, "echoing message");
        if confirm == Confirm::Ok {
            let _ = tx.send(Event::Message(line.to_string()));
        }
    })
    .with_disconnected(move |_channel| {
        let _ = on_gone.send(Event::PeerGone);
    })
}
