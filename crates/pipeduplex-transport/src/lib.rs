//! Named local stream endpoints.
//!
//! An endpoint is a string identifier mapped to a Unix domain socket inside
//! a socket directory. One process listens on it and exactly one peer
//! connects; the resulting [`IpcStream`] is then used in a single direction.
//!
//! This is the lowest layer of pipeduplex. Framing and the duplex channel
//! build on the types provided here.

pub mod endpoint;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{default_socket_dir, EndpointName, MAX_ENDPOINT_NAME_LEN};
pub use error::{Result, TransportError};
pub use traits::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
