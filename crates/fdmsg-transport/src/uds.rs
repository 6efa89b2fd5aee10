use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Default permission mode for created socket paths.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// Unix `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on the BSDs.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// A bound, listening Unix domain socket.
///
/// The socket file is created at bind time with hardened permissions and
/// removed again on drop, provided the path still refers to the socket this
/// listener created.
pub struct Listener {
    inner: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
}

impl Listener {
    /// Bind and listen at `path` with the default permission mode.
    ///
    /// A stale socket file at the path is removed first; any other kind of
    /// file is refused rather than clobbered.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source, path: &PathBuf| TransportError::Bind {
            path: path.clone(),
            source,
        };

        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let meta = std::fs::symlink_metadata(&path).map_err(|e| bind_err(e, &path))?;
            if !meta.file_type().is_socket() {
                return Err(bind_err(
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                    &path,
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(e, &path))?;
        }

        let inner = UnixListener::bind(&path).map_err(|e| bind_err(e, &path))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_err(e, &path))?;
        let meta = std::fs::symlink_metadata(&path).map_err(|e| bind_err(e, &path))?;

        info!(?path, "listening on unix domain socket");
        Ok(Self {
            inner,
            path,
            created_inode: (meta.dev(), meta.ino()),
        })
    }

    /// Accept one incoming connection (blocking).
    pub fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.inner.accept().map_err(TransportError::Accept)?;
        debug!("accepted connection");
        Ok(stream)
    }

    /// The path this listener is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let (dev, ino) = self.created_inode;
        if let Ok(meta) = std::fs::symlink_metadata(&self.path) {
            if meta.file_type().is_socket() && meta.dev() == dev && meta.ino() == ino {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

/// Connect to a listening Unix domain socket (blocking).
pub fn connect(path: impl AsRef<Path>) -> Result<UnixStream> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(?path, "connected to unix domain socket");
    Ok(stream)
}

/// A connected pair of stream sockets in this process, for loopback
/// channels between a parent and a child it is about to spawn, and for
/// tests.
pub fn socket_pair() -> Result<(UnixStream, UnixStream)> {
    UnixStream::pair().map_err(TransportError::Io)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fdmsg-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bind_accept_connect_roundtrip() {
        let dir = scratch_dir("uds");
        let sock = dir.join("test.sock");

        let listener = Listener::bind(&sock).unwrap();
        assert!(sock.exists());

        let path = sock.clone();
        let client = std::thread::spawn(move || {
            let mut stream = connect(&path).unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        client.join().unwrap();

        drop(listener);
        assert!(!sock.exists(), "socket file removed on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_overlong_path() {
        let long = "/tmp/".to_string() + &"f".repeat(200) + ".sock";
        assert!(matches!(
            Listener::bind(&long),
            Err(TransportError::PathTooLong { .. })
        ));
    }

    #[test]
    fn default_mode_is_owner_only() {
        let dir = scratch_dir("mode");
        let sock = dir.join("mode.sock");
        let listener = Listener::bind(&sock).unwrap();
        let mode = std::fs::metadata(&sock).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn refuses_to_clobber_regular_file() {
        let dir = scratch_dir("clobber");
        let sock = dir.join("not-a-socket");
        std::fs::write(&sock, b"data").unwrap();
        assert!(matches!(
            Listener::bind(&sock),
            Err(TransportError::Bind { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_spares_replaced_path() {
        let dir = scratch_dir("replace");
        let sock = dir.join("drop.sock");
        let listener = Listener::bind(&sock).unwrap();

        std::fs::remove_file(&sock).unwrap();
        std::fs::write(&sock, b"replacement").unwrap();

        drop(listener);
        assert!(sock.exists(), "replaced path must survive drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn pair_is_connected_both_ways() {
        let (mut a, mut b) = socket_pair().unwrap();
        a.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        b.write_all(b"pong").unwrap();
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }
}
