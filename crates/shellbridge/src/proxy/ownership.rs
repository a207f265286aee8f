//! Socket-file ownership tracking.
//!
//! A Unix socket path can be silently re-bound by another process: it
//! removes the file and binds a fresh socket in its place. The listener of
//! the original socket keeps running but is no longer reachable. Recording
//! the `(device, inode)` pair right after binding lets the owner detect this.
//! A bound listener keeps its inode allocated after the unlink, so the
//! replacement always gets a different number. Metadata changes such as
//! `chmod` or `touch` leave the pair alone.

use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;
use std::time::Duration;

use tokio::net::UnixStream;

/// Identity of the socket file as bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipToken {
    dev: u64,
    ino: u64,
}

/// Result of comparing a token against the live path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The path still refers to our socket.
    Owned,
    /// The path no longer exists.
    Missing,
    /// Something other than a socket sits at the path.
    NotSocket,
    /// A different socket was bound at the path.
    Replaced,
}

impl Ownership {
    pub fn is_owned(self) -> bool {
        self == Ownership::Owned
    }
}

impl OwnershipToken {
    /// Record the identity of the file at `path`.
    pub fn capture(path: &Path) -> io::Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    /// Compare against what is at `path` now.
    pub fn check(&self, path: &Path) -> Ownership {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(_) => return Ownership::Missing,
        };
        if !meta.file_type().is_socket() {
            return Ownership::NotSocket;
        }
        if meta.dev() != self.dev || meta.ino() != self.ino {
            return Ownership::Replaced;
        }
        Ownership::Owned
    }
}

/// What an existing socket file turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketProbe {
    /// Nothing at the path.
    Absent,
    /// A file is there but nobody accepts connections.
    Stale,
    /// Another process is listening.
    Live,
}

/// Find out whether something is listening at `path`.
///
/// A connect that does not complete within `timeout` counts as live, since
/// only a listener with a full backlog behaves that way.
pub async fn probe(path: &Path, timeout: Duration) -> SocketProbe {
    if std::fs::symlink_metadata(path).is_err() {
        return SocketProbe::Absent;
    }
    match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
        Ok(Ok(_stream)) => SocketProbe::Live,
        Ok(Err(_)) => SocketProbe::Stale,
        Err(_) => SocketProbe::Live,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_token_tracks_bound_socket() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("owned.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let token = OwnershipToken::capture(&path).unwrap();
        assert_eq!(token.check(&path), Ownership::Owned);
        assert!(token.check(&path).is_owned());
    }

    #[tokio::test]
    async fn test_metadata_changes_keep_ownership() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("owned.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        let token = OwnershipToken::capture(&path).unwrap();

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        assert_eq!(token.check(&path), Ownership::Owned);
    }

    #[tokio::test]
    async fn test_token_detects_replacement() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("owned.sock");
        let _first = UnixListener::bind(&path).unwrap();
        let token = OwnershipToken::capture(&path).unwrap();

        // Renaming keeps the original inodes allocated.
        std::fs::rename(&path, dir.path().join("first.sock")).unwrap();
        assert_eq!(token.check(&path), Ownership::Missing);

        std::fs::write(&path, b"not a socket").unwrap();
        assert_eq!(token.check(&path), Ownership::NotSocket);

        std::fs::rename(&path, dir.path().join("regular")).unwrap();
        let _second = UnixListener::bind(&path).unwrap();
        assert_eq!(token.check(&path), Ownership::Replaced);
    }

    #[tokio::test]
    async fn test_probe_distinguishes_stale_from_live() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probe.sock");
        let timeout = Duration::from_secs(1);

        assert_eq!(probe(&path, timeout).await, SocketProbe::Absent);

        let listener = UnixListener::bind(&path).unwrap();
        assert_eq!(probe(&path, timeout).await, SocketProbe::Live);

        // Dropping the listener leaves the file behind with nobody accepting.
        drop(listener);
        assert_eq!(probe(&path, timeout).await, SocketProbe::Stale);
    }
}
