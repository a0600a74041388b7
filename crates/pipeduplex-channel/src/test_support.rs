use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::ChannelConfig;
use crate::role::{EndpointPair, Role};

/// Fresh socket directory under /tmp (short enough for `sun_path`).
pub(crate) fn socket_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/pdc-{}-{}-{}",
        tag,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// Test configuration with a bounded handshake so a broken test fails
/// instead of hanging.
pub(crate) fn config_for(dir: &Path, pair: EndpointPair, role: Role) -> ChannelConfig {
    ChannelConfig::new(pair, role)
        .with_socket_dir(dir)
        .with_handshake_timeout(Duration::from_secs(5))
}
