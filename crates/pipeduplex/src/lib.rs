//! Duplex line-message channel over a pair of named unidirectional endpoints.
//!
//! Two cooperating processes agree on two endpoint names and opposite roles.
//! Each side writes to one endpoint and reads from the other; once both are
//! connected they exchange newline-delimited text messages.
//!
//! # Crate Structure
//!
//! - [`transport`]: endpoint naming, Unix domain socket listen/connect, drain query
//! - [`frame`]: newline line codec with blocking reader and writer
//! - [`channel`]: roles, handshake, and the [`channel::Channel`] lifecycle (behind `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use pipeduplex_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use pipeduplex_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use pipeduplex_channel::*;
}
