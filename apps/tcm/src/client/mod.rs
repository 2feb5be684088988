mod commands;

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Command;

use tcm_core::proto::{Envelope, ErrorCode, Outbound, Request, RequestId, Response, RpcError};
use tcm_ipc::framing::{self, FramedStream};
use tcm_utils::{ensure_dir, runtime_paths};

pub use commands::admin::{console_interactive, dispatch};
pub use commands::backup::{backup_now, backup_status, backup_watch, set_schedule};
pub use commands::build::{cancel_build, compile, sync, BuildReport};
pub use commands::core::{ping, shutdown, status};
pub use commands::player::{banned_accounts, player_info};
pub use commands::server::{daemon_logs_tail, follow_logs, logs_tail, stop, up};

/// A failure the daemon reported for a request.
#[derive(Debug)]
pub struct DaemonError(pub RpcError);

impl DaemonError {
    pub fn code(&self) -> ErrorCode {
        self.0.code
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.message)
    }
}

impl std::error::Error for DaemonError {}

/// One socket connection to tcmd.
pub struct Daemon {
    framed: FramedStream,
    next_id: RequestId,
}

impl Daemon {
    /// Connect, starting the daemon first when nothing is listening.
    pub async fn connect() -> anyhow::Result<Self> {
        Ok(Self::wrap(connect_or_start().await?))
    }

    fn wrap(framed: FramedStream) -> Self {
        Self { framed, next_id: 1 }
    }

    /// Send `payload` without waiting for its response.
    pub async fn send(&mut self, payload: Request) -> anyhow::Result<RequestId> {
        let id = self.next_id;
        self.next_id += 1;
        framing::send_request(&mut self.framed, &Envelope { id, payload }).await?;
        Ok(id)
    }

    pub async fn next_outbound(&mut self) -> anyhow::Result<Outbound> {
        framing::read_outbound(&mut self.framed)
            .await?
            .context("tcmd closed the connection")
    }

    /// Send `payload` and wait for its response; events that arrive first are dropped.
    pub async fn call(&mut self, payload: Request) -> anyhow::Result<Response> {
        let id = self.send(payload).await?;
        loop {
            match self.next_outbound().await? {
                Outbound::Response(env) if env.id == id => return into_result(env.payload),
                _ => continue,
            }
        }
    }
}

pub(crate) fn into_result(payload: Response) -> anyhow::Result<Response> {
    match payload {
        Response::Error(err) => Err(DaemonError(err).into()),
        other => Ok(other),
    }
}

pub(crate) fn unexpected(response: Response) -> anyhow::Error {
    anyhow::anyhow!("unexpected response: {response:?}")
}

async fn connect_or_start() -> anyhow::Result<FramedStream> {
    let paths = runtime_paths();
    ensure_dir(&paths.runtime_dir)?;

    if let Ok(stream) = tcm_ipc::socket::connect(&paths.socket_path).await {
        return Ok(framing::framed(stream));
    }

    start_daemon_detached().await?;

    for _ in 0..30 {
        if let Ok(stream) = tcm_ipc::socket::connect(&paths.socket_path).await {
            return Ok(framing::framed(stream));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    anyhow::bail!("failed to connect to tcmd after starting it");
}

async fn start_daemon_detached() -> anyhow::Result<()> {
    // Dev: run an arbitrary command via shell
    //   TCM_TCMD_CMD='cargo run -p tcmd' cargo run -p tcm -- ping
    if let Ok(cmd) = std::env::var("TCM_TCMD_CMD") {
        detached(Command::new("sh").arg("-lc").arg(cmd))?;
        return Ok(());
    }

    // explicit binary path
    if let Ok(path) = std::env::var("TCM_TCMD_PATH") {
        detached(&mut Command::new(path))?;
        return Ok(());
    }

    detached(&mut Command::new("tcmd")).context("tcmd is not on PATH")?;
    Ok(())
}

fn detached(command: &mut Command) -> std::io::Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(drop)
}
