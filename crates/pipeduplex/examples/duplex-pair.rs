//! Both roles in one process: an initiator and a responder exchange a few
//! messages over a shared pair of endpoint names.
//!
//! Run with:
//!   cargo run --example duplex-pair

use std::fs;
use std::sync::mpsc;
use std::time::Duration;

use pipeduplex::channel::{Channel, ChannelConfig, ChannelHandlers, EndpointPair, Role};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("pipeduplex-pair-{}", std::process::id()));
    let pair = EndpointPair::parse("pairA", "pairB")?;

    let (tx, rx) = mpsc::channel::<(Role, String)>();
    let open = |role: Role| {
        let tx = tx.clone();
        let config = ChannelConfig::new(pair.clone(), role)
            .with_socket_dir(&sock_dir)
            .with_handshake_timeout(Duration::from_secs(5));
        Channel::new(
            config,
            ChannelHandlers::new(move |_, line| {
                let _ = tx.send((role, line.to_string()));
            }),
        )
    };

    let initiator = open(Role::Initiator);
    let responder = open(Role::Responder);
    let init_handshake = initiator.establish()?;
    let resp_handshake = responder.establish()?;
    eprintln!("[initiator] {}", init_handshake.wait());
    eprintln!("[responder] {}", resp_handshake.wait());

    eprintln!("[initiator] send: {}", initiator.send("ping"));
    eprintln!("[responder] send: {}", responder.send("pong"));

    for _ in 0..2 {
        let (role, line) = rx.recv_timeout(Duration::from_secs(5))?;
        eprintln!("[{role}] received {line:?}");
    }

    initiator.close();
    responder.close();
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
