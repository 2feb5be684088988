use async_trait::async_trait;
use tcm_core::CoreError;
use tcm_core::proto::{ClientStatus, ExitInfo, LogStream, ServiceKind};
use tokio::sync::{broadcast, watch};

/// One line a service printed.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: LogStream,
    pub line: String,
}

/// Capability contract shared by the local process and remote session clients.
///
/// `start` must only be called on a client that is not online; `stop` is a
/// no-op on a stopped client. Commands are fire-and-forget: whatever the
/// server prints back arrives through `output`.
#[async_trait]
pub trait ServerClient: Send + Sync {
    fn service(&self) -> ServiceKind;

    /// Executable path or network address, for display.
    fn endpoint(&self) -> String;

    fn is_online(&self) -> bool;

    async fn start(&self) -> Result<(), CoreError>;

    async fn stop(&self) -> Result<(), CoreError>;

    async fn send_command(&self, command: &str) -> Result<(), CoreError>;

    /// Subscribe before `start` to see every line.
    fn output(&self) -> broadcast::Receiver<OutputLine>;

    /// Holds `Some` once the client has gone away. Set exactly once per start.
    fn exited(&self) -> watch::Receiver<Option<ExitInfo>>;

    /// OS process id; only local clients have one.
    fn pid(&self) -> Option<u32> {
        None
    }

    fn status(&self) -> ClientStatus {
        ClientStatus {
            service: self.service(),
            online: self.is_online(),
            pid: self.pid(),
            endpoint: self.endpoint(),
        }
    }
}

/// Resolves with the exit once the client has gone away, `None` if the
/// client was dropped first.
pub async fn wait_exited(mut exited: watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    loop {
        if let Some(exit) = exited.borrow_and_update().clone() {
            return Some(exit);
        }
        if exited.changed().await.is_err() {
            return exited.borrow().clone();
        }
    }
}
