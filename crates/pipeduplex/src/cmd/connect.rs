use std::io::BufRead;
use std::sync::mpsc::Sender;

use pipeduplex_channel::Channel;

use crate::cmd::{event_channel, forwarding_handlers, ConnectArgs, Event};
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let (tx, rx) = event_channel();
    let channel = args.channel.open(forwarding_handlers(tx.clone()))?;
    let role = channel.role();

    spawn_stdin_reader(tx)?;

    let mut outcome = Ok(SUCCESS);
    while let Ok(event) = rx.recv() {
        match event {
            Event::Message(line) => print_message(role, &line, format),
            Event::Input(line) => {
                if let Err(err) = forward(&channel, &line) {
                    outcome = Err(err);
                    break;
                }
                if !channel.is_connected() {
                    break;
                }
            }
            Event::InputClosed | Event::Interrupted => break,
            Event::PeerGone => {
                tracing::info!("peer disconnected");
                break;
            }
        }
    }

    channel.close();
    outcome
}

/// Send one input line. A peer that went away ends the session quietly.
fn forward(channel: &Channel, line: &str) -> CliResult<()> {
    match channel.try_send(line) {
        Ok(()) => Ok(()),
        Err(err) if !channel.is_connected() => {
            tracing::debug!(error = %err, "input not sent, channel closed");
            Ok(())
        }
        Err(err) => Err(channel_error("send failed", err)),
    }
}

fn spawn_stdin_reader(tx: Sender<Event>) -> CliResult<()> {
    std::thread::Builder::new()
        .name("pipeduplex-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Event::Input(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(Event::InputClosed);
        })
        .map(drop)
        .map_err(|err| CliError::new(INTERNAL, format!("failed to spawn stdin reader: {err}")))
}
