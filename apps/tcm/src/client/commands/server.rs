use std::io::IsTerminal;

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use tcm_core::proto::{ClientStatus, ErrorCode, Event, LogLine, Outbound, Request, Response, Topic};

use crate::client::{unexpected, Daemon, DaemonError};
use crate::render::print_log_line;

pub struct StartInfo {
    pub auth: ClientStatus,
    pub world: ClientStatus,
    pub started_at_ms: u64,
}

pub struct StopInfo {
    pub warnings: Vec<String>,
    pub stopped_at_ms: u64,
}

pub struct LogsTailInfo {
    pub lines: Vec<LogLine>,
    pub truncated: bool,
}

/// Start both services. A stale service is only killed after the operator
/// agrees, or up front with `force`.
pub async fn up(force: bool) -> Result<StartInfo> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::Start { force }).await {
        Ok(resp) => start_info(resp),
        Err(err) if !force && already_running(&err) => {
            if !confirm_force(&err)? {
                anyhow::bail!("{err}; start cancelled");
            }
            start_info(daemon.call(Request::Start { force: true }).await?)
        }
        Err(err) => Err(err),
    }
}

fn already_running(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DaemonError>()
        .is_some_and(|err| err.code() == ErrorCode::ServerAlreadyRunning)
}

fn confirm_force(err: &anyhow::Error) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(false);
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{err}. Kill it and start a fresh server?"))
        .default(false)
        .interact()
        .context("confirmation prompt failed")
}

fn start_info(resp: Response) -> Result<StartInfo> {
    match resp {
        Response::Started {
            auth,
            world,
            started_at_ms,
        } => Ok(StartInfo {
            auth,
            world,
            started_at_ms,
        }),
        other => Err(unexpected(other)),
    }
}

pub async fn stop() -> Result<StopInfo> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::Stop {}).await? {
        Response::Stopped {
            warnings,
            stopped_at_ms,
        } => Ok(StopInfo {
            warnings,
            stopped_at_ms,
        }),
        other => Err(unexpected(other)),
    }
}

pub async fn logs_tail(lines: usize) -> Result<LogsTailInfo> {
    tail(Request::LogsTail { lines }).await
}

pub async fn daemon_logs_tail(lines: usize) -> Result<LogsTailInfo> {
    tail(Request::DaemonLogsTail { lines }).await
}

async fn tail(request: Request) -> Result<LogsTailInfo> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(request).await? {
        Response::LogsTail { lines, truncated } => Ok(LogsTailInfo { lines, truncated }),
        other => Err(unexpected(other)),
    }
}

/// Print the last `lines` lines, then keep printing new ones until interrupted.
pub async fn follow_logs(lines: usize, daemon_logs: bool) -> Result<()> {
    let (tail_request, topic) = if daemon_logs {
        (Request::DaemonLogsTail { lines }, Topic::DaemonLogs)
    } else {
        (Request::LogsTail { lines }, Topic::Logs)
    };

    let mut daemon = Daemon::connect().await?;
    match daemon.call(tail_request).await? {
        Response::LogsTail { lines, .. } => lines.iter().for_each(print_log_line),
        other => return Err(unexpected(other)),
    }
    daemon.call(Request::Subscribe { topics: vec![topic] }).await?;

    loop {
        tokio::select! {
            outbound = daemon.next_outbound() => {
                match outbound? {
                    Outbound::Event(Event::Log(line) | Event::DaemonLog(line)) => print_log_line(&line),
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
