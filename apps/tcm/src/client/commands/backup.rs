use anyhow::Result;
use tcm_core::proto::{BackupEvent, BackupSchedule, BackupStatus, BackupStore, Event, Outbound, Request, Response, Topic};

use crate::client::{unexpected, Daemon};

pub async fn set_schedule(schedule: BackupSchedule) -> Result<BackupStatus> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::BackupSchedule { schedule }).await? {
        Response::BackupStatus(status) => Ok(status),
        other => Err(unexpected(other)),
    }
}

pub async fn backup_status() -> Result<BackupStatus> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::BackupStatus {}).await? {
        Response::BackupStatus(status) => Ok(status),
        other => Err(unexpected(other)),
    }
}

/// Run backups for `stores` now (the scheduled stores when empty) and wait
/// for each job to report.
pub async fn backup_now(stores: Vec<BackupStore>, mut on_event: impl FnMut(&BackupEvent)) -> Result<Vec<BackupStore>> {
    let mut daemon = Daemon::connect().await?;
    daemon
        .call(Request::Subscribe {
            topics: vec![Topic::Backup],
        })
        .await?;

    let triggered = match daemon.call(Request::BackupNow { stores }).await? {
        Response::BackupTriggered { stores } => stores,
        other => return Err(unexpected(other)),
    };

    let mut pending = triggered.clone();
    while !pending.is_empty() {
        let Outbound::Event(Event::Backup(event)) = daemon.next_outbound().await? else {
            continue;
        };
        match &event {
            BackupEvent::Completed { store, .. } | BackupEvent::Failed { store, .. } => {
                pending.retain(|pending| pending != store);
                on_event(&event);
            }
            _ => {}
        }
    }
    Ok(triggered)
}

/// Stream backup events until interrupted.
pub async fn backup_watch(mut on_event: impl FnMut(&BackupEvent)) -> Result<()> {
    let mut daemon = Daemon::connect().await?;
    daemon
        .call(Request::Subscribe {
            topics: vec![Topic::Backup],
        })
        .await?;

    loop {
        tokio::select! {
            outbound = daemon.next_outbound() => {
                if let Outbound::Event(Event::Backup(event)) = outbound? {
                    on_event(&event);
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
