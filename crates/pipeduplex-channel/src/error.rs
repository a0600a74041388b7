use std::time::Duration;

use crate::channel::ChannelState;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] pipeduplex_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] pipeduplex_frame::FrameError),

    /// The operation is not valid in the channel's current state.
    #[error("invalid channel state: expected {expected}, found {found}")]
    InvalidState {
        expected: ChannelState,
        found: ChannelState,
    },

    /// The role string is not a known role.
    #[error("unknown role '{0}' (expected 'initiator' or 'responder')")]
    InvalidRole(String),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The peer did not drain a sent message in time.
    #[error("drain timed out after {0:?}")]
    DrainTimeout(Duration),

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,

    /// The channel has no connected write endpoint.
    #[error("channel not connected")]
    NotConnected,

    /// The background thread could not be started.
    #[error("failed to spawn channel thread: {0}")]
    ThreadSpawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
