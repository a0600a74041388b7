use std::fmt;
use std::net::Shutdown;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use pipeduplex_frame::{FrameError, LineReader, LineWriter};
use pipeduplex_transport::{IpcStream, TransportError};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::handlers::{
    ChannelHandlers, ConnectionHandler, ConnectionResult, DisconnectHandler, MessageHandler,
};
use crate::handshake::{self, Endpoints, HandshakeHandle, ResultSlot};
use crate::role::{resolve, Role};

/// Lifecycle state of a channel.
///
/// Transitions only move forward: `Idle → Connecting → Connected → Closed`,
/// or `Connecting → Closed` when the handshake fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Closed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Idle => "idle",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`Channel::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confirm {
    /// The message was written and drained by the peer.
    Ok,
    /// The message was not delivered.
    Nok,
}

impl Confirm {
    pub fn is_ok(self) -> bool {
        self == Confirm::Ok
    }
}

impl fmt::Display for Confirm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confirm::Ok => f.write_str("OK"),
            Confirm::Nok => f.write_str("NOK"),
        }
    }
}

/// Duplicate handles used to interrupt blocked reads and writes.
struct Controls {
    reader: IpcStream,
    writer: IpcStream,
}

impl Controls {
    fn shutdown(&self) {
        for stream in [&self.reader, &self.writer] {
            if let Err(err) = stream.shutdown(Shutdown::Both) {
                debug!(error = %err, "endpoint shutdown failed");
            }
        }
    }
}

struct Shared {
    config: ChannelConfig,
    on_message: MessageHandler,
    on_connection_result: Mutex<Option<ConnectionHandler>>,
    on_disconnected: Mutex<Option<DisconnectHandler>>,
    state: Mutex<ChannelState>,
    writer: Mutex<Option<LineWriter<IpcStream>>>,
    controls: Mutex<Option<Controls>>,
}

impl Shared {
    fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    /// Move to `Closed` and release both endpoints. Returns the previous state.
    fn close(&self) -> ChannelState {
        let previous = std::mem::replace(&mut *lock(&self.state), ChannelState::Closed);

        if let Some(controls) = lock(&self.controls).take() {
            controls.shutdown();
        }
        // Waits for an in-flight send, which the shutdown above has unblocked.
        drop(lock(&self.writer).take());

        previous
    }

    /// Store freshly connected endpoints and move to `Connected`.
    fn install(&self, endpoints: Endpoints) -> Result<LineReader<IpcStream>> {
        let controls = Controls {
            reader: endpoints.reader.try_clone()?,
            writer: endpoints.writer.try_clone()?,
        };
        let line_config = self.config.line_config();
        let reader = LineReader::with_config(endpoints.reader, line_config.clone());
        let writer = LineWriter::with_config(endpoints.writer, line_config);

        let mut state = lock(&self.state);
        if *state != ChannelState::Connecting {
            controls.shutdown();
            return Err(ChannelError::Closed);
        }
        *lock(&self.writer) = Some(writer);
        *lock(&self.controls) = Some(controls);
        *state = ChannelState::Connected;
        Ok(reader)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let controls = self
            .controls
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(controls) = controls {
            debug!("last channel handle dropped, releasing endpoints");
            controls.shutdown();
        }
    }
}

/// One duplex message channel over a pair of named endpoints.
///
/// `Channel` is a cheap handle; clones refer to the same channel. The
/// endpoints are released by [`Channel::close`], by the peer disconnecting
/// (unless `close_on_disconnect` is off), or when the last handle is dropped.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

impl Channel {
    /// Create an idle channel. Nothing is opened until [`Channel::establish`].
    pub fn new(config: ChannelConfig, handlers: ChannelHandlers) -> Self {
        let ChannelHandlers {
            on_message,
            on_connection_result,
            on_disconnected,
        } = handlers;

        Self {
            shared: Arc::new(Shared {
                config,
                on_message,
                on_connection_result: Mutex::new(on_connection_result),
                on_disconnected: Mutex::new(on_disconnected),
                state: Mutex::new(ChannelState::Idle),
                writer: Mutex::new(None),
                controls: Mutex::new(None),
            }),
        }
    }

    /// Start the handshake on a background thread and return immediately.
    ///
    /// The outcome is reported exactly once, to the connection handler and to
    /// the returned [`HandshakeHandle`]. On success the same thread then runs
    /// the receive loop. A channel can be established only once; calling this
    /// on a channel that is not idle fails with [`ChannelError::InvalidState`].
    pub fn establish(&self) -> Result<HandshakeHandle> {
        {
            let mut state = lock(&self.shared.state);
            if *state != ChannelState::Idle {
                return Err(ChannelError::InvalidState {
                    expected: ChannelState::Idle,
                    found: *state,
                });
            }
            *state = ChannelState::Connecting;
        }

        let handler = lock(&self.shared.on_connection_result).take();
        let (slot, handle) = ResultSlot::new(handler);
        let slot = Arc::new(slot);

        let role = self.shared.config.role;
        let shared = Arc::clone(&self.shared);
        let thread_slot = Arc::clone(&slot);
        let spawned = std::thread::Builder::new()
            .name(format!("pipeduplex-{role}"))
            .spawn(move || run(shared, &thread_slot));

        if let Err(err) = spawned {
            self.shared.close();
            let err = ChannelError::ThreadSpawn(err);
            warn!(%role, error = %err, "handshake not started");
            slot.complete(ConnectionResult::failed(err.to_string()));
        }

        Ok(handle)
    }

    /// Send one message and wait until the peer has drained it.
    ///
    /// Never fails loudly: every error is logged and reported as
    /// [`Confirm::Nok`]. Use [`Channel::try_send`] for the error itself.
    pub fn send(&self, message: impl fmt::Display) -> Confirm {
        let text = message.to_string();
        match self.try_send(&text) {
            Ok(()) => Confirm::Ok,
            Err(err @ (ChannelError::NotConnected | ChannelError::Closed)) => {
                debug!(error = %err, "send skipped");
                Confirm::Nok
            }
            Err(err) => {
                warn!(error = %err, size = text.len(), "send failed");
                Confirm::Nok
            }
        }
    }

    /// Send one message and wait until the peer has drained it.
    pub fn try_send(&self, message: &str) -> Result<()> {
        match self.shared.state() {
            ChannelState::Connected => {}
            ChannelState::Closed => return Err(ChannelError::Closed),
            ChannelState::Idle | ChannelState::Connecting => {
                return Err(ChannelError::NotConnected)
            }
        }

        let mut guard = lock(&self.shared.writer);
        let writer = guard.as_mut().ok_or(ChannelError::NotConnected)?;
        writer.send(message)?;
        self.wait_for_drain(writer.get_ref())?;
        debug!(size = message.len(), "message sent");
        Ok(())
    }

    /// Release both endpoints. Idempotent; the channel ends up `Closed`.
    ///
    /// The peer is not notified explicitly; it observes end-of-stream.
    pub fn close(&self) {
        let previous = self.shared.close();
        if previous != ChannelState::Closed {
            info!(role = %self.shared.config.role, from = %previous, "channel closed");
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn role(&self) -> Role {
        self.shared.config.role
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    fn wait_for_drain(&self, stream: &IpcStream) -> Result<()> {
        let config = &self.shared.config;
        let deadline = config.drain_timeout.map(|t| Instant::now() + t);

        loop {
            if let None | Some(0) = stream.pending_output()? {
                // Unread data discarded by a departing peer leaves a reset behind.
                return match stream.take_error()? {
                    Some(err) => Err(TransportError::Io(err).into()),
                    None => Ok(()),
                };
            }
            if self.shared.state() == ChannelState::Closed {
                return Err(ChannelError::Closed);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, config.drain_timeout) {
                if Instant::now() >= deadline {
                    return Err(ChannelError::DrainTimeout(timeout));
                }
            }
            std::thread::sleep(config.drain_poll_interval);
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("role", &self.shared.config.role)
            .field("endpoints", &self.shared.config.endpoints)
            .field("state", &self.shared.state())
            .finish()
    }
}

/// Body of the channel thread: handshake, then the receive loop.
fn run(shared: Arc<Shared>, slot: &ResultSlot) {
    let span = info_span!("channel", role = %shared.config.role);
    let _enter = span.enter();

    let plan = resolve(&shared.config.endpoints, shared.config.role);
    let outcome = handshake::perform(&plan, &shared.config, || {
        shared.state() == ChannelState::Closed
    })
    .and_then(|endpoints| shared.install(endpoints));

    let reader = match outcome {
        Ok(reader) => reader,
        Err(err) => {
            warn!(error = %err, "handshake failed");
            shared.close();
            slot.complete(ConnectionResult::failed(err.to_string()));
            return;
        }
    };

    slot.complete(ConnectionResult::ok());

    let weak = Arc::downgrade(&shared);
    drop(shared);
    receive_loop(&weak, reader);
}

enum LoopEnd {
    EndOfStream,
    Failed(FrameError),
    Closed,
    Dropped,
}

/// The channel if it is still open, otherwise why the loop has to stop.
fn open_channel(weak: &Weak<Shared>) -> std::result::Result<Channel, LoopEnd> {
    let shared = weak.upgrade().ok_or(LoopEnd::Dropped)?;
    if shared.state() == ChannelState::Closed {
        return Err(LoopEnd::Closed);
    }
    Ok(Channel { shared })
}

/// Deliver received lines until end-of-stream, a read error, or close.
///
/// Lines still queued when the channel closes are neither read nor delivered.
fn receive_loop(weak: &Weak<Shared>, mut reader: LineReader<IpcStream>) {
    let end = loop {
        // No strong handle is held across the blocking read.
        if let Err(end) = open_channel(weak) {
            break end;
        }

        let line = match reader.read_line() {
            Ok(line) => line,
            Err(FrameError::ConnectionClosed) => break LoopEnd::EndOfStream,
            Err(err) => break LoopEnd::Failed(err),
        };

        match open_channel(weak) {
            Ok(channel) => (channel.shared.on_message)(&channel, &line),
            Err(end) => break end,
        }
    };

    let Some(shared) = weak.upgrade() else {
        debug!("receive loop stopped, channel dropped");
        return;
    };
    let channel = Channel { shared };

    if channel.state() == ChannelState::Closed {
        debug!("receive loop stopped after close");
        return;
    }

    match end {
        LoopEnd::EndOfStream => info!("peer disconnected"),
        LoopEnd::Failed(err) => warn!(error = %err, "receive failed, treating peer as gone"),
        LoopEnd::Closed | LoopEnd::Dropped => return,
    }

    let handler = lock(&channel.shared.on_disconnected).take();
    if let Some(handler) = handler {
        handler(&channel);
    }

    if channel.shared.config.close_on_disconnect {
        channel.close();
    }
}

/// Lock a mutex, recovering the data if a handler panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
