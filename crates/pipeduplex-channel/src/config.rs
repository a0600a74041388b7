use std::path::PathBuf;
use std::time::Duration;

use pipeduplex_frame::{LineConfig, DEFAULT_MAX_LINE_LENGTH};
use pipeduplex_transport::default_socket_dir;

use crate::role::{EndpointPair, Role};

/// Configuration of one channel instance.
///
/// Timeouts default to `None`: the handshake waits for the peer and a send
/// waits for the peer to drain for as long as it takes.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Endpoint identifiers shared with the peer.
    pub endpoints: EndpointPair,
    /// This process's role; the peer must use the opposite one.
    pub role: Role,
    /// Directory holding the endpoint sockets.
    pub socket_dir: PathBuf,
    /// Upper bound for the whole handshake.
    pub handshake_timeout: Option<Duration>,
    /// Delay between connect attempts while the peer is not listening yet.
    pub connect_retry_interval: Duration,
    /// Delay between accept polls while waiting for the peer to connect.
    pub accept_poll_interval: Duration,
    /// Upper bound for waiting on the peer to drain one sent message.
    pub drain_timeout: Option<Duration>,
    /// Delay between drain checks.
    pub drain_poll_interval: Duration,
    /// Maximum message length in bytes.
    pub max_line_length: usize,
    /// Close the channel when the peer disconnects.
    pub close_on_disconnect: bool,
}

impl ChannelConfig {
    /// Configuration with default tuning for `endpoints` and `role`.
    pub fn new(endpoints: EndpointPair, role: Role) -> Self {
        Self {
            endpoints,
            role,
            socket_dir: default_socket_dir(),
            handshake_timeout: None,
            connect_retry_interval: Duration::from_millis(25),
            accept_poll_interval: Duration::from_millis(10),
            drain_timeout: None,
            drain_poll_interval: Duration::from_millis(1),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            close_on_disconnect: true,
        }
    }

    /// Builder-style override of the socket directory.
    pub fn with_socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = dir.into();
        self
    }

    /// Builder-style override of the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    pub(crate) fn line_config(&self) -> LineConfig {
        LineConfig {
            max_line_length: self.max_line_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unbounded() {
        let pair = EndpointPair::parse("a", "b").unwrap();
        let config = ChannelConfig::new(pair, Role::Initiator);

        assert!(config.handshake_timeout.is_none());
        assert!(config.drain_timeout.is_none());
        assert!(config.close_on_disconnect);
        assert_eq!(config.socket_dir, default_socket_dir());
        assert_eq!(config.line_config().max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }

    #[test]
    fn builder_overrides() {
        let pair = EndpointPair::parse("a", "b").unwrap();
        let config = ChannelConfig::new(pair, Role::Responder)
            .with_socket_dir("/tmp/pd-custom")
            .with_handshake_timeout(Duration::from_secs(2));

        assert_eq!(config.socket_dir, PathBuf::from("/tmp/pd-custom"));
        assert_eq!(config.handshake_timeout, Some(Duration::from_secs(2)));
    }
}
