use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,

    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    UnsupportedProtocol,

    DaemonBusy,
    ServerAlreadyRunning,
    ServerNotRunning,
    ServerOffline,
    MissingBinary,
    LaunchFailed,

    PreconditionFailed,
    InvalidConfig,
    IoError,
    DatabaseError,

    Cancelled,
    Unsupported,

    Internal,
}
