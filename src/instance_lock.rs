//! Single hub instance per host, held through a Unix socket.
//!
//! Two hubs on the same stream would each evaluate every snapshot and write
//! every alert twice, since cooldown ledgers are process-local. The socket is
//! released by the OS when the process dies, so no stale lock survives a crash.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SOCKET_NAME: &str = "iotmesh-hub.sock";

#[derive(Debug, Error)]
pub enum InstanceLockError {
    #[error("another hub instance is already running")]
    AlreadyRunning,

    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for as long as the value lives; the socket file is removed on drop.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the per-user hub lock.
    pub fn acquire() -> Result<Self, InstanceLockError> {
        Self::acquire_at(socket_path(std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from)))
    }

    pub fn acquire_at(path: PathBuf) -> Result<Self, InstanceLockError> {
        if path.exists() {
            // A socket nobody answers on was left by a killed process.
            if UnixStream::connect(&path).is_ok() {
                return Err(InstanceLockError::AlreadyRunning);
            }
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(InstanceLockError::AlreadyRunning),
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Socket location inside `runtime_dir`, or `/tmp` when there is none.
pub fn socket_path(runtime_dir: Option<PathBuf>) -> PathBuf {
    runtime_dir
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(SOCKET_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_socket(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "iotmesh-hub-test-{}-{}.sock",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn test_socket_path_uses_runtime_dir() {
        assert_eq!(
            socket_path(Some(PathBuf::from("/run/user/1000"))),
            PathBuf::from("/run/user/1000/iotmesh-hub.sock")
        );
        assert_eq!(socket_path(None), PathBuf::from("/tmp/iotmesh-hub.sock"));
    }

    #[test]
    fn test_second_acquire_fails_until_release() {
        let path = scratch_socket("second");
        let first = InstanceLock::acquire_at(path.clone()).unwrap();
        assert!(matches!(
            InstanceLock::acquire_at(path.clone()),
            Err(InstanceLockError::AlreadyRunning)
        ));

        drop(first);
        assert!(!path.exists());
        let again = InstanceLock::acquire_at(path.clone()).unwrap();
        assert_eq!(again.path(), path.as_path());
    }

    #[test]
    fn test_stale_socket_is_replaced() {
        let path = scratch_socket("stale");
        {
            let listener = UnixListener::bind(&path).unwrap();
            drop(listener);
        }
        // The file is still there but nobody listens.
        assert!(path.exists());
        let lock = InstanceLock::acquire_at(path.clone()).unwrap();
        drop(lock);
    }
}
