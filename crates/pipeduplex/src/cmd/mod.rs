use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use clap::{Args, Subcommand};
use pipeduplex_channel::{
    Channel, ChannelConfig, ChannelHandlers, ConnectionResult, EndpointPair, Role,
};
use pipeduplex_transport::EndpointName;

use crate::exit::{CliError, CliResult, FAILURE, INTERNAL, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Forward stdin lines to the peer and print received messages.
    Connect(ConnectArgs),
    /// Send one or more messages and exit.
    Send(SendArgs),
    /// Print received messages.
    Listen(ListenArgs),
    /// Send every received message back to the peer.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connect(args) => connect::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Echo(args) => echo::run(args),
        Command::Version(args) => version::run(args, format),
    }
}

/// Endpoint and role options shared by every channel command.
#[derive(Args, Debug)]
pub struct ChannelArgs {
    /// Endpoint A (written by the responder, read by the initiator).
    pub endpoint_a: EndpointName,
    /// Endpoint B (written by the initiator, read by the responder).
    pub endpoint_b: EndpointName,
    /// Role of this process; the peer must use the opposite one.
    #[arg(long, short = 'r')]
    pub role: Role,
    /// Directory holding the endpoint sockets.
    #[arg(long, value_name = "DIR", env = "PIPEDUPLEX_SOCKET_DIR")]
    pub socket_dir: Option<PathBuf>,
    /// Handshake timeout (e.g. 5s, 500ms). Waits indefinitely when omitted.
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Message to send; repeat for several messages, sent in order.
    #[arg(long, short = 'd', required = true)]
    pub data: Vec<String>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub channel: ChannelArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Something the command loop has to react to.
#[derive(Debug)]
pub enum Event {
    /// Line received from the peer.
    Message(String),
    /// Line read from local input, to be sent.
    Input(String),
    PeerGone,
    InputClosed,
    Interrupted,
}

/// Handlers forwarding received messages and the disconnect to `tx`.
pub fn forwarding_handlers(tx: Sender<Event>) -> ChannelHandlers {
    let on_gone = tx.clone();
    ChannelHandlers::new(move |_channel, line| {
        let _ = tx.send(Event::Message(line.to_string()));
    })
    .with_disconnected(move |_channel| {
        let _ = on_gone.send(Event::PeerGone);
    })
}

impl ChannelArgs {
    pub fn config(&self) -> ChannelConfig {
        let pair = EndpointPair::new(self.endpoint_a.clone(), self.endpoint_b.clone());
        let config = ChannelConfig::new(pair, self.role);
        match &self.socket_dir {
            Some(dir) => config.with_socket_dir(dir),
            None => config,
        }
    }

    /// Create the channel and block until the handshake has completed.
    pub fn open(&self, handlers: ChannelHandlers) -> CliResult<Channel> {
        let timeout = self.timeout.as_deref().map(parse_duration).transpose()?;
        let channel = Channel::new(self.config(), handlers);
        let handle = channel
            .establish()
            .map_err(|err| crate::exit::channel_error("establish failed", err))?;

        tracing::info!(
            role = %self.role,
            a = %self.endpoint_a,
            b = %self.endpoint_b,
            "waiting for peer"
        );

        let result = match timeout {
            Some(timeout) => match handle.wait_timeout(timeout) {
                Some(result) => result,
                None => {
                    channel.close();
                    // Let the handshake thread release its endpoints before exiting.
                    let _ = handle.wait();
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("handshake timed out after {timeout:?}"),
                    ));
                }
            },
            None => handle.wait(),
        };

        handshake_outcome(result)?;
        Ok(channel)
    }
}

fn handshake_outcome(result: ConnectionResult) -> CliResult<()> {
    if result.connected {
        tracing::info!("connected");
        Ok(())
    } else {
        Err(CliError::new(
            FAILURE,
            format!("handshake failed: {}", result.detail),
        ))
    }
}

/// Forward Ctrl-C to the command loop.
pub fn forward_ctrlc(tx: Sender<Event>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        let _ = tx.send(Event::Interrupted);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn event_channel() -> (Sender<Event>, Receiver<Event>) {
    mpsc::channel()
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
