use std::io::ErrorKind;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// Listening side of one endpoint, backed by a filesystem Unix domain socket.
///
/// The socket file is removed again on drop, so a listener released right
/// after its single accept frees the endpoint name for reuse.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    /// `(dev, ino)` of the socket file this listener created.
    identity: (u64, u64),
}

impl UnixDomainSocket {
    /// Permission mode of created socket files: owner only.
    const SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `path`.
    ///
    /// A stale socket left at `path` is replaced; any other kind of file is
    /// refused.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let len = path.as_os_str().len();
        if len >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: Self::MAX_PATH_LEN,
            });
        }

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                let source = std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                );
                return Err(bind_error(&path, source));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_error(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_error(&path, e))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
            .map_err(|e| bind_error(&path, e))?;
        let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_error(&path, e))?;

        info!(?path, "listening on endpoint");
        Ok(Self {
            listener,
            path,
            identity: (metadata.dev(), metadata.ino()),
        })
    }

    /// Wait for one peer to connect, polling every `interval`.
    ///
    /// `proceed` is consulted before every poll; once it returns `false` the
    /// wait is abandoned and `Ok(None)` is returned.
    pub fn accept_polling(
        &self,
        interval: Duration,
        mut proceed: impl FnMut() -> bool,
    ) -> Result<Option<IpcStream>> {
        self.listener
            .set_nonblocking(true)
            .map_err(TransportError::Accept)?;

        while proceed() {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    // BSD-derived systems let the accepted socket inherit O_NONBLOCK.
                    stream.set_nonblocking(false)?;
                    debug!(path = ?self.path, "accepted connection");
                    return Ok(Some(IpcStream::from_unix(stream)));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => std::thread::sleep(interval),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
        Ok(None)
    }

    /// Connect to an endpoint that may not be listening yet.
    ///
    /// Missing or refusing sockets are retried every `interval` for as long as
    /// `proceed` returns `true`; `Ok(None)` means the wait was abandoned.
    /// Any other connect error is returned immediately.
    pub fn connect_polling(
        path: impl AsRef<Path>,
        interval: Duration,
        mut proceed: impl FnMut() -> bool,
    ) -> Result<Option<IpcStream>> {
        let path = path.as_ref();
        let mut waiting = false;

        while proceed() {
            match UnixStream::connect(path) {
                Ok(stream) => {
                    debug!(?path, "connected to endpoint");
                    return Ok(Some(IpcStream::from_unix(stream)));
                }
                Err(err) if is_not_ready(&err) => {
                    if !waiting {
                        debug!(?path, "endpoint not listening yet, waiting");
                        waiting = true;
                    }
                    std::thread::sleep(interval);
                }
                Err(source) => {
                    return Err(TransportError::Connect {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
        Ok(None)
    }
}

fn bind_error(path: &Path, source: std::io::Error) -> TransportError {
    TransportError::Bind {
        path: path.to_path_buf(),
        source,
    }
}

fn is_not_ready(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::Interrupted
    )
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket() && (metadata.dev(), metadata.ino()) == self.identity {
            debug!(path = ?self.path, "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket path replaced, leaving it in place");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    const POLL: Duration = Duration::from_millis(5);

    fn test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pduds-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_bind_accept_connect() {
        let dir = test_dir("basic");
        let sock_path = dir.join("test.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        let path_clone = sock_path.clone();
        let handle = std::thread::spawn(move || {
            let mut client = UnixDomainSocket::connect_polling(&path_clone, POLL, || true)
                .unwrap()
                .unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept_polling(POLL, || true).unwrap().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();

        drop(listener);
        assert!(
            !sock_path.exists(),
            "socket file should be cleaned up on drop"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixDomainSocket::bind(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_bind_default_permissions_hardened() {
        let dir = test_dir("perms");
        let sock_path = dir.join("perm.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_rejects_existing_non_socket_file() {
        let dir = test_dir("file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = UnixDomainSocket::bind(&sock_path);
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_connect_polling_waits_for_late_listener() {
        let dir = test_dir("late");
        let sock_path = dir.join("late.sock");

        let path_clone = sock_path.clone();
        let connector = std::thread::spawn(move || {
            UnixDomainSocket::connect_polling(&path_clone, POLL, || true)
                .unwrap()
                .is_some()
        });

        std::thread::sleep(Duration::from_millis(50));
        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        let _stream = listener.accept_polling(POLL, || true).unwrap().unwrap();

        assert!(connector.join().unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_accept_polling_gives_up_when_told() {
        let dir = test_dir("cancel");
        let listener = UnixDomainSocket::bind(dir.join("idle.sock")).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            stop_clone.store(true, Ordering::SeqCst);
        });

        let accepted = listener
            .accept_polling(POLL, || !stop.load(Ordering::SeqCst))
            .unwrap();
        assert!(accepted.is_none());

        canceller.join().unwrap();
        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_connect_polling_gives_up_after_attempts() {
        let dir = test_dir("no-listener");
        let mut attempts = 0;

        let result = UnixDomainSocket::connect_polling(dir.join("absent.sock"), POLL, || {
            attempts += 1;
            attempts <= 3
        });
        assert!(result.unwrap().is_none());
        assert_eq!(attempts, 4);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_drop_does_not_remove_replaced_path() {
        let dir = test_dir("drop-race");
        let sock_path = dir.join("drop.sock");

        let listener = UnixDomainSocket::bind(&sock_path).unwrap();
        assert!(sock_path.exists());

        // Replace path while listener is alive.
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
