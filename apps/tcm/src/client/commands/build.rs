use anyhow::Result;
use tcm_core::proto::{BuildEvent, BuildOutcome, Event, Outbound, Platform, Request, Response, RunId, Topic};

use crate::client::{unexpected, Daemon};
use crate::render::print_build_event;

pub enum BuildReport {
    Finished { run: RunId, outcome: BuildOutcome },
    Detached { run: RunId },
    /// The request stopped the compile that was already running instead of starting one.
    CancelledPrior { run: RunId },
}

pub async fn sync(detach: bool) -> Result<BuildReport> {
    run_and_follow(Request::Sync {}, detach).await
}

pub async fn compile(platform: Option<Platform>, sync_first: bool, detach: bool) -> Result<BuildReport> {
    run_and_follow(
        Request::Compile {
            platform,
            sync_first,
        },
        detach,
    )
    .await
}

pub async fn cancel_build() -> Result<RunId> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::CancelBuild {}).await? {
        Response::BuildCancelled { run } => Ok(run),
        other => Err(unexpected(other)),
    }
}

/// Submit a run and print its events until it finishes. Ctrl-C asks the
/// daemon to cancel the run and keeps following it to its end.
async fn run_and_follow(request: Request, detach: bool) -> Result<BuildReport> {
    let mut daemon = Daemon::connect().await?;
    if !detach {
        daemon
            .call(Request::Subscribe {
                topics: vec![Topic::Build],
            })
            .await?;
    }

    // the response is written before any event that follows it
    let run = match daemon.call(request).await? {
        Response::BuildStarted { run, .. } => run,
        Response::BuildCancelled { run } => return Ok(BuildReport::CancelledPrior { run }),
        other => return Err(unexpected(other)),
    };

    if detach {
        return Ok(BuildReport::Detached { run });
    }

    let mut cancel_sent = false;
    loop {
        tokio::select! {
            outbound = daemon.next_outbound() => {
                if let Outbound::Event(Event::Build(event)) = outbound? {
                    if let Some(outcome) = show(run, event) {
                        return Ok(BuildReport::Finished { run, outcome });
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                cancel_sent = true;
                eprintln!("cancelling run {run}...");
                daemon.send(Request::CancelBuild {}).await?;
            }
        }
    }
}

fn show(run: RunId, event: BuildEvent) -> Option<BuildOutcome> {
    if event.run() != run {
        return None;
    }
    print_build_event(&event);
    match event {
        BuildEvent::Finished { outcome, .. } => Some(outcome),
        _ => None,
    }
}
