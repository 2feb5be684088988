use anyhow::Result;
use tcm_core::proto::{BackupStatus, DaemonStatus, PipelineState, Request, Response, ServerStatus};
use tcm_core::PROTOCOL_VERSION;

use crate::client::{unexpected, Daemon};

pub struct StatusInfo {
    pub daemon: DaemonStatus,
    pub server: ServerStatus,
    pub build: PipelineState,
    pub backup: BackupStatus,
}

pub async fn ping() -> Result<String> {
    let mut daemon = Daemon::connect().await?;
    let resp = daemon
        .call(Request::Ping {
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
        })
        .await?;

    match resp {
        Response::Pong {
            daemon_version,
            protocol_version,
        } => Ok(format!("pong: daemon={daemon_version} protocol={protocol_version}")),
        other => Err(unexpected(other)),
    }
}

pub async fn shutdown() -> Result<String> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::Shutdown {}).await? {
        Response::ShutdownAck {} => Ok("Daemon acknowledged shutdown request.".to_string()),
        other => Err(unexpected(other)),
    }
}

pub async fn status() -> Result<StatusInfo> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::Status {}).await? {
        Response::Status {
            daemon,
            server,
            build,
            backup,
        } => Ok(StatusInfo {
            daemon,
            server,
            build,
            backup,
        }),
        other => Err(unexpected(other)),
    }
}
