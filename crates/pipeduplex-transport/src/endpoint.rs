use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Maximum length of an endpoint identifier in bytes.
pub const MAX_ENDPOINT_NAME_LEN: usize = 64;

const SOCKET_SUFFIX: &str = ".sock";

/// Opaque identifier of one unidirectional endpoint.
///
/// The name is supplied by configuration and is only validated so that it
/// maps onto a single file name inside the socket directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointName(String);

impl EndpointName {
    /// Validate and wrap an endpoint identifier.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("must not be empty")
        } else if name.len() > MAX_ENDPOINT_NAME_LEN {
            Some("longer than 64 bytes")
        } else if name == "." || name == ".." {
            Some("reserved path component")
        } else if name.contains('/') || name.contains('\0') {
            Some("must not contain '/' or NUL")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(TransportError::InvalidEndpoint { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// The identifier as given.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Socket path of this endpoint inside `dir`.
    pub fn socket_path(&self, dir: impl AsRef<Path>) -> PathBuf {
        dir.as_ref().join(format!("{}{SOCKET_SUFFIX}", self.0))
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EndpointName {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for EndpointName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Directory used for endpoint sockets when none is configured.
pub fn default_socket_dir() -> PathBuf {
    std::env::temp_dir().join("pipeduplex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        let name = EndpointName::new("pipeA").unwrap();
        assert_eq!(name.as_str(), "pipeA");
        assert_eq!(name.to_string(), "pipeA");
    }

    #[test]
    fn rejects_unmappable_names() {
        for bad in ["", ".", "..", "a/b", "nul\0byte"] {
            let err = EndpointName::new(bad).unwrap_err();
            assert!(matches!(err, TransportError::InvalidEndpoint { .. }), "{bad:?}");
        }
        let long = "x".repeat(MAX_ENDPOINT_NAME_LEN + 1);
        assert!(EndpointName::new(long).is_err());
    }

    #[test]
    fn socket_path_joins_directory() {
        let name: EndpointName = "server".parse().unwrap();
        assert_eq!(
            name.socket_path("/tmp/pd"),
            PathBuf::from("/tmp/pd/server.sock")
        );
    }
}
