//! Minimal echo responder: waits for an initiator and echoes every line back.
//!
//! Run with:
//!   cargo run --example echo-responder
//!
//! In another terminal:
//!   cargo run --features cli -- send --role initiator demoA demoB \
//!     --socket-dir /tmp/pipeduplex-demo --data hello

use std::sync::mpsc;

use pipeduplex::channel::{Channel, ChannelConfig, ChannelHandlers, EndpointPair, Role};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pair = EndpointPair::parse("demoA", "demoB")?;
    let config = ChannelConfig::new(pair, Role::Responder).with_socket_dir("/tmp/pipeduplex-demo");

    let (done_tx, done_rx) = mpsc::channel();
    let handlers = ChannelHandlers::new(|channel, line| {
        eprintln!("Received {line:?}");
        channel.send(line);
    })
    .with_disconnected(move |_| {
        let _ = done_tx.send(());
    });

    let channel = Channel::new(config, handlers);
    let result = channel.establish()?.wait();
    eprintln!("Handshake: {result}");
    if !result.connected {
        return Err(result.detail.into());
    }

    // Echo until the initiator goes away.
    let _ = done_rx.recv();
    eprintln!("Peer disconnected");
    Ok(())
}
