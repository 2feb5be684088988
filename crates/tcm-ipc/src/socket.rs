use std::path::Path;
use tokio::net::{UnixListener, UnixStream};

pub async fn connect(path: &Path) -> std::io::Result<UnixStream> {
    UnixStream::connect(path).await
}

/// Outcome of trying to claim the daemon socket.
pub enum Claim {
    Bound(UnixListener),
    /// Another daemon is accepting on the socket.
    InUse,
}

/// Bind the daemon socket, replacing a stale socket file left by a dead daemon.
pub async fn claim(path: &Path) -> std::io::Result<Claim> {
    if path.exists() {
        if socket_alive(path).await {
            return Ok(Claim::InUse);
        }
        std::fs::remove_file(path)?;
    }
    UnixListener::bind(path).map(Claim::Bound)
}

pub async fn socket_alive(path: &Path) -> bool {
    UnixStream::connect(path).await.is_ok()
}
