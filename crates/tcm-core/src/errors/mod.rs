use std::path::PathBuf;

use thiserror::Error;

use crate::proto::{ErrorCode, RpcError, ServiceKind};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unsupported protocol version: client={client} daemon={daemon}")]
    UnsupportedProtocol { client: u32, daemon: u32 },

    #[error("server is offline")]
    ServerOffline,

    #[error("the file '{}' could not be found", .path.display())]
    MissingBinary { path: PathBuf },

    #[error("failed to launch {target}: {reason}")]
    Launch { target: String, reason: String },

    #[error("server is not running")]
    NotRunning,

    #[error("{service} is already running")]
    AlreadyRunning { service: ServiceKind },

    #[error("no character selected")]
    NoCharacterSelected,

    #[error("invalid character name: {0}")]
    InvalidCharacterName(String),

    #[error("no build is running")]
    NothingToCancel,

    #[error("nothing to send: the message is empty")]
    EmptyMessage,

    #[error("busy: {0}")]
    Busy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("{0}")]
    Cancelled(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn launch(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Launch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }
}

/// Map internal errors -> stable wire errors.
/// Keep this mapping conservative and stable.
impl From<CoreError> for RpcError {
    fn from(e: CoreError) -> Self {
        let message = e.to_string();
        let (code, details) = match &e {
            CoreError::UnsupportedProtocol { client, daemon } => (
                ErrorCode::UnsupportedProtocol,
                vec![
                    ("client_protocol", client.to_string()),
                    ("daemon_protocol", daemon.to_string()),
                ],
            ),
            CoreError::ServerOffline => (ErrorCode::ServerOffline, Vec::new()),
            CoreError::MissingBinary { path } => (
                ErrorCode::MissingBinary,
                vec![("path", path.display().to_string())],
            ),
            CoreError::Launch { target, .. } => {
                (ErrorCode::LaunchFailed, vec![("target", target.clone())])
            }
            CoreError::NotRunning => (ErrorCode::ServerNotRunning, Vec::new()),
            CoreError::AlreadyRunning { service } => (
                ErrorCode::ServerAlreadyRunning,
                vec![("service", service.to_string())],
            ),
            CoreError::NoCharacterSelected
            | CoreError::InvalidCharacterName(_)
            | CoreError::NothingToCancel
            | CoreError::EmptyMessage => {
                (ErrorCode::PreconditionFailed, Vec::new())
            }
            CoreError::Busy(_) => (ErrorCode::DaemonBusy, Vec::new()),
            CoreError::InvalidConfig(_) => (ErrorCode::InvalidConfig, Vec::new()),
            CoreError::Io { context, .. } => {
                (ErrorCode::IoError, vec![("context", context.to_string())])
            }
            CoreError::Database(_) => (ErrorCode::DatabaseError, Vec::new()),
            CoreError::Cancelled(_) => (ErrorCode::Cancelled, Vec::new()),
            CoreError::Unsupported(_) => (ErrorCode::Unsupported, Vec::new()),
            CoreError::Internal(_) => (ErrorCode::Internal, Vec::new()),
        };

        RpcError {
            code,
            message,
            details: details
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }
}
