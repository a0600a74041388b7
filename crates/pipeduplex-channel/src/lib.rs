//! Duplex line-message channel over a pair of named unidirectional endpoints.
//!
//! Two processes agree out of band on two endpoint names and on opposite
//! [`Role`]s. Each side listens on one endpoint (which it writes to) and
//! connects to the other (which it reads from). Once both are connected the
//! [`Channel`] sends text lines in one direction and delivers received lines
//! to a handler in the other.

pub mod channel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod handshake;
pub mod role;

pub use channel::{Channel, ChannelState, Confirm};
pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use handlers::{
    ChannelHandlers, ConnectionHandler, ConnectionResult, DisconnectHandler, MessageHandler,
};
pub use handshake::HandshakeHandle;
pub use role::{resolve, Direction, EndpointPair, EndpointStep, HandshakePlan, Mode, Role};

#[cfg(test)]
pub(crate) mod test_support;
