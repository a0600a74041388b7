use std::net::Shutdown;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use pipeduplex_transport::{IpcStream, TransportError, UnixDomainSocket};
use tracing::{debug, info};

use crate::channel::lock;
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::handlers::{ConnectionHandler, ConnectionResult};
use crate::role::{Direction, HandshakePlan, Mode};

/// Both endpoints of an established channel, halves already restricted to
/// their direction.
pub(crate) struct Endpoints {
    pub(crate) reader: IpcStream,
    pub(crate) writer: IpcStream,
}

/// Caller-side view of a handshake in progress.
///
/// Receives the same [`ConnectionResult`] that is passed to the connection
/// handler. Dropping the handle does not affect the handshake.
#[derive(Debug)]
pub struct HandshakeHandle {
    rx: Receiver<ConnectionResult>,
    result: OnceLock<ConnectionResult>,
}

impl HandshakeHandle {
    /// Block until the handshake has completed.
    pub fn wait(&self) -> ConnectionResult {
        if let Some(result) = self.result.get() {
            return result.clone();
        }
        let result = self.rx.recv().unwrap_or_else(|_| missing_result());
        self.result.get_or_init(|| result).clone()
    }

    /// Block until the handshake has completed or `timeout` elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ConnectionResult> {
        if let Some(result) = self.result.get() {
            return Some(result.clone());
        }
        let result = match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => missing_result(),
        };
        Some(self.result.get_or_init(|| result).clone())
    }

    /// The result, if the handshake has already completed.
    pub fn try_result(&self) -> Option<ConnectionResult> {
        if let Some(result) = self.result.get() {
            return Some(result.clone());
        }
        let result = match self.rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => missing_result(),
        };
        Some(self.result.get_or_init(|| result).clone())
    }
}

fn missing_result() -> ConnectionResult {
    ConnectionResult::failed("handshake ended without reporting a result")
}

/// Single-assignment slot for the handshake outcome.
///
/// The first `complete` call hands the result to the connection handler and
/// the [`HandshakeHandle`]; later calls are ignored.
pub(crate) struct ResultSlot {
    inner: Mutex<Option<(Option<ConnectionHandler>, SyncSender<ConnectionResult>)>>,
}

impl ResultSlot {
    pub(crate) fn new(handler: Option<ConnectionHandler>) -> (Self, HandshakeHandle) {
        let (tx, rx) = mpsc::sync_channel(1);
        let slot = Self {
            inner: Mutex::new(Some((handler, tx))),
        };
        let handle = HandshakeHandle {
            rx,
            result: OnceLock::new(),
        };
        (slot, handle)
    }

    pub(crate) fn complete(&self, result: ConnectionResult) {
        let Some((handler, sender)) = lock(&self.inner).take() else {
            debug!("handshake result already reported");
            return;
        };

        if let Some(handler) = handler {
            handler(&result);
        }
        let _ = sender.send(result);
    }
}

/// Open both endpoints in the order given by `plan`.
///
/// Blocks until both are connected, the configured timeout passes, or
/// `is_cancelled` reports true. Endpoints opened before a failure are
/// released when this returns.
pub(crate) fn perform(
    plan: &HandshakePlan,
    config: &ChannelConfig,
    is_cancelled: impl Fn() -> bool,
) -> Result<Endpoints> {
    let deadline = config.handshake_timeout.map(|t| Instant::now() + t);
    let proceed = || !is_cancelled() && deadline.map_or(true, |d| Instant::now() < d);

    let mut reader = None;
    let mut writer = None;

    for step in plan.steps() {
        let path = step.endpoint.socket_path(&config.socket_dir);
        let opened = match step.mode {
            Mode::Listen => listen_once(&path, config, &proceed)?,
            Mode::Connect => {
                UnixDomainSocket::connect_polling(&path, config.connect_retry_interval, &proceed)?
            }
        };

        let Some(stream) = opened else {
            return Err(if is_cancelled() {
                ChannelError::Closed
            } else {
                ChannelError::Timeout(config.handshake_timeout.unwrap_or_default())
            });
        };

        match step.direction {
            Direction::Write => {
                stream.shutdown(Shutdown::Read)?;
                writer = Some(stream);
            }
            Direction::Read => {
                stream.shutdown(Shutdown::Write)?;
                reader = Some(stream);
            }
        }
        debug!(endpoint = %step.endpoint, mode = ?step.mode, "endpoint open");
    }

    match (reader, writer) {
        (Some(reader), Some(writer)) => {
            info!(
                role = %plan.role(),
                read = %plan.read_endpoint(),
                write = %plan.write_endpoint(),
                "handshake complete"
            );
            Ok(Endpoints { reader, writer })
        }
        _ => Err(ChannelError::HandshakeFailed(
            "plan did not open both directions".to_string(),
        )),
    }
}

/// Listen on `path` until exactly one peer has connected.
///
/// The listener is released before returning, which frees the endpoint name
/// for the opposite direction when both names are the same.
fn listen_once(
    path: &Path,
    config: &ChannelConfig,
    proceed: &impl Fn() -> bool,
) -> Result<Option<IpcStream>> {
    std::fs::create_dir_all(&config.socket_dir).map_err(|source| TransportError::Bind {
        path: config.socket_dir.clone(),
        source,
    })?;

    let listener = UnixDomainSocket::bind(path)?;
    let accepted = listener.accept_polling(config.accept_poll_interval, proceed)?;

    if let Some((uid, _gid, pid)) = accepted.as_ref().and_then(IpcStream::peer_credentials) {
        debug!(peer_pid = pid, peer_uid = uid, ?path, "peer connected");
    }

    Ok(accepted)
}
