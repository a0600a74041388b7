use std::fmt;

use serde::Serialize;

use crate::channel::Channel;

/// Invoked on the receive thread for every received line.
pub type MessageHandler = Box<dyn Fn(&Channel, &str) + Send + Sync>;
/// Invoked once with the outcome of the handshake.
pub type ConnectionHandler = Box<dyn FnOnce(&ConnectionResult) + Send>;
/// Invoked once when the peer goes away while the channel is connected.
pub type DisconnectHandler = Box<dyn FnOnce(&Channel) + Send>;

/// Outcome of a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionResult {
    pub connected: bool,
    pub detail: String,
}

impl ConnectionResult {
    /// Detail text of a successful handshake.
    pub const OK_DETAIL: &'static str = "OK";

    pub fn ok() -> Self {
        Self {
            connected: true,
            detail: Self::OK_DETAIL.to_string(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            connected: false,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ConnectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.connected, self.detail)
    }
}

/// Handlers bound to a channel at construction.
///
/// They cannot be replaced afterwards. Handlers run on the channel's
/// background thread; any state they share with other threads must be
/// synchronized by the caller.
pub struct ChannelHandlers {
    pub(crate) on_message: MessageHandler,
    pub(crate) on_connection_result: Option<ConnectionHandler>,
    pub(crate) on_disconnected: Option<DisconnectHandler>,
}

impl ChannelHandlers {
    /// Handlers delivering received lines to `on_message`.
    pub fn new(on_message: impl Fn(&Channel, &str) + Send + Sync + 'static) -> Self {
        Self {
            on_message: Box::new(on_message),
            on_connection_result: None,
            on_disconnected: None,
        }
    }

    /// Observe the handshake outcome.
    pub fn with_connection_result(
        mut self,
        handler: impl FnOnce(&ConnectionResult) + Send + 'static,
    ) -> Self {
        self.on_connection_result = Some(Box::new(handler));
        self
    }

    /// Observe the peer disconnecting.
    pub fn with_disconnected(mut self, handler: impl FnOnce(&Channel) + Send + 'static) -> Self {
        self.on_disconnected = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for ChannelHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandlers")
            .field("on_connection_result", &self.on_connection_result.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .finish_non_exhaustive()
    }
}
