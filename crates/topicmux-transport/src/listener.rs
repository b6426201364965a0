#[cfg(unix)]
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
#[cfg(unix)]
use std::path::{Path, PathBuf};

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::MuxStream;

/// Listens for and accepts byte-stream connections on an [`Endpoint`].
///
/// Filesystem sockets are created with mode `0600` and removed again on
/// `Drop`, unless the path was replaced by something else in the meantime.
pub struct Listener {
    inner: ListenerInner,
    endpoint: Endpoint,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocketGuard),
}

#[cfg(unix)]
struct UnixSocketGuard {
    listener: tokio::net::UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl Listener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on `endpoint`.
    ///
    /// For Unix endpoints an existing socket file at the path is treated as
    /// stale and removed first; any other kind of file is left alone and the
    /// bind fails.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let inner = match endpoint {
            Endpoint::Tcp(addr) => {
                let listener =
                    TcpListener::bind(addr.as_str())
                        .await
                        .map_err(|source| TransportError::Bind {
                            endpoint: endpoint.clone(),
                            source,
                        })?;
                ListenerInner::Tcp(listener)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                ListenerInner::Unix(bind_unix(endpoint, path, Self::DEFAULT_SOCKET_MODE)?)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(TransportError::Unsupported(endpoint.clone())),
        };

        let endpoint = match &inner {
            // Resolve port 0 to the actual port so callers can dial it.
            ListenerInner::Tcp(listener) => match listener.local_addr() {
                Ok(addr) => Endpoint::Tcp(addr.to_string()),
                Err(_) => endpoint.clone(),
            },
            #[cfg(unix)]
            ListenerInner::Unix(_) => endpoint.clone(),
        };

        info!(%endpoint, "listening");
        Ok(Self { inner, endpoint })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<MuxStream> {
        let stream = match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, addr) = listener.accept().await.map_err(TransportError::Accept)?;
                stream.set_nodelay(true).map_err(TransportError::Accept)?;
                debug!(%addr, "accepted tcp connection");
                MuxStream::from_tcp(stream)
            }
            #[cfg(unix)]
            ListenerInner::Unix(guard) => {
                let (stream, _addr) = guard
                    .listener
                    .accept()
                    .await
                    .map_err(TransportError::Accept)?;
                debug!(path = ?guard.path, "accepted unix connection");
                MuxStream::from_unix(stream)
            }
        };
        Ok(stream)
    }

    /// The endpoint this listener is bound to (with the real port for `tcp://host:0`).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[cfg(unix)]
fn bind_unix(endpoint: &Endpoint, path: &Path, mode: u32) -> Result<UnixSocketGuard> {
    let bind_err = |source| TransportError::Bind {
        endpoint: endpoint.clone(),
        source,
    };

    let path_bytes = path.as_os_str().len();
    if path_bytes >= Listener::MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len: path_bytes,
            max: Listener::MAX_PATH_LEN,
        });
    }

    // Remove stale socket if it exists, but never remove non-socket files.
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if !metadata.file_type().is_socket() {
            return Err(bind_err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "existing path is not a unix socket",
            )));
        }
        debug!(?path, "removing stale socket");
        std::fs::remove_file(path).map_err(bind_err)?;
    }

    let listener = tokio::net::UnixListener::bind(path).map_err(bind_err)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(bind_err)?;
    let created = std::fs::symlink_metadata(path).map_err(bind_err)?;

    Ok(UnixSocketGuard {
        listener,
        path: path.to_path_buf(),
        created_inode: Some((created.dev(), created.ino())),
    })
}

#[cfg(unix)]
impl Drop for UnixSocketGuard {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::stream::connect;

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "topicmux-transport-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[tokio::test]
    async fn tcp_bind_accept_connect() {
        let listener = Listener::bind(&Endpoint::tcp("127.0.0.1:0"))
            .await
            .expect("tcp bind should succeed");
        let endpoint = listener.endpoint().clone();
        assert!(!endpoint.to_string().ends_with(":0"));

        let client = tokio::spawn(async move {
            let mut stream = connect(&endpoint).await.expect("connect should succeed");
            stream.write_all(b"hello").await.expect("write should succeed");
        });

        let mut server = listener.accept().await.expect("accept should succeed");
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.expect("read should succeed");
        assert_eq!(&buf, b"hello");
        assert_eq!(server.kind(), "tcp");

        client.await.expect("client task should finish");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_bind_accept_connect_and_cleanup() {
        let dir = temp_dir("uds");
        let sock_path = dir.join("test.sock");
        let endpoint = Endpoint::unix(&sock_path);

        let listener = Listener::bind(&endpoint).await.expect("bind should succeed");
        assert!(sock_path.exists());
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let dial = endpoint.clone();
        let client = tokio::spawn(async move {
            let mut stream = connect(&dial).await.expect("connect should succeed");
            stream.write_all(b"hello").await.expect("write should succeed");
        });

        let mut server = listener.accept().await.expect("accept should succeed");
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.expect("read should succeed");
        assert_eq!(&buf, b"hello");
        client.await.expect("client task should finish");

        drop(listener);
        assert!(!sock_path.exists(), "socket file should be cleaned up on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_bind_replaces_stale_socket() {
        let dir = temp_dir("stale");
        let endpoint = Endpoint::unix(dir.join("stale.sock"));

        let first = Listener::bind(&endpoint).await.expect("first bind");
        // Leak the first guard so its socket file stays behind like a crashed process.
        std::mem::forget(first);

        let second = Listener::bind(&endpoint).await;
        assert!(second.is_ok(), "stale socket should be replaced");

        drop(second);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("file");
        let sock_path = dir.join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let result = Listener::bind(&Endpoint::unix(&sock_path)).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
        assert!(sock_path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = Listener::bind(&Endpoint::unix(long_path)).await;
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn drop_does_not_remove_replaced_path() {
        let dir = temp_dir("drop-race");
        let sock_path = dir.join("drop.sock");

        let listener = Listener::bind(&Endpoint::unix(&sock_path))
            .await
            .expect("bind should succeed");

        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn connect_to_missing_endpoint_fails() {
        let dir = temp_dir("missing");
        let endpoint = Endpoint::unix(dir.join("nobody-home.sock"));
        let result = connect(&endpoint).await;
        assert!(matches!(
            result,
            Err(TransportError::Connect { .. }) | Err(TransportError::Unsupported(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
