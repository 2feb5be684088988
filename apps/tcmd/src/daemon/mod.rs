use std::process;
use std::sync::Arc;
use std::time::Duration;

use tcm_build::{CompileRequest, Submitted};
use tcm_core::proto::*;
use tcm_core::{CoreError, PROTOCOL_VERSION, pkg_version};
use tcm_ipc::framing::{self, FramedStream};
use tcm_utils::now_millis;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::database::player_info;

const BUILD_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn serve(listener: UnixListener, ctx: Arc<Context>) -> std::io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(err) = handle_conn(stream, ctx).await {
                debug!("client connection ended: {err}");
            }
        });
    }
}

async fn handle_conn(stream: UnixStream, ctx: Arc<Context>) -> std::io::Result<()> {
    let mut framed = framing::framed(stream);
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            request = framing::read_request(&mut framed) => {
                let Some(req_env) = request? else {
                    return Ok(());
                };
                let req_id = req_env.id;

                let payload = match req_env.payload {
                    Request::Subscribe { topics } => {
                        subscription = Some(Subscription::new(&ctx, topics.clone()));
                        Response::Subscribed { topics }
                    }
                    Request::Unsubscribe {} => {
                        subscription = None;
                        Response::Unsubscribed {}
                    }
                    Request::Shutdown {} => {
                        shutdown(&ctx).await;
                        respond(&mut framed, req_id, Response::ShutdownAck {}).await?;
                        process::exit(0);
                    }
                    request => match handle_request(&ctx, request).await {
                        Ok(payload) => payload,
                        Err(err) => Response::Error(err.into()),
                    },
                };
                respond(&mut framed, req_id, payload).await?;
            }

            Some(event) = next_event(&mut subscription) => {
                framing::send_outbound(&mut framed, &Outbound::Event(event)).await?;
            }
        }
    }
}

async fn respond(framed: &mut FramedStream, id: RequestId, payload: Response) -> std::io::Result<()> {
    framing::send_outbound(framed, &Outbound::Response(Envelope { id, payload })).await
}

/// Cancels the build run and waits for it to release its scratch directory.
/// Game servers are left running; the next start reports them as strays.
async fn shutdown(ctx: &Context) {
    info!("shutdown requested");
    match ctx.pipeline.cancel() {
        Ok(Some(run)) => info!("cancelled build run {run}"),
        Ok(None) => {}
        Err(err) => info!("waiting for build run: {err}"),
    }
    let _ = ctx.events.send(Event::Lifecycle(LifecycleEvent::DaemonShuttingDown {
        at_ms: now_millis(),
    }));
    if tokio::time::timeout(BUILD_DRAIN_TIMEOUT, ctx.pipeline.wait_idle())
        .await
        .is_err()
    {
        warn!("build run still active after {}s", BUILD_DRAIN_TIMEOUT.as_secs());
    }
}

async fn handle_request(ctx: &Context, request: Request) -> Result<Response, CoreError> {
    match request {
        Request::Ping {
            client_version,
            protocol_version,
        } => {
            if protocol_version != PROTOCOL_VERSION {
                return Err(CoreError::UnsupportedProtocol {
                    client: protocol_version,
                    daemon: PROTOCOL_VERSION,
                });
            }
            debug!("ping from client {client_version}");
            Ok(Response::Pong {
                daemon_version: pkg_version().to_string(),
                protocol_version: PROTOCOL_VERSION,
            })
        }

        Request::Status {} => Ok(Response::Status {
            daemon: ctx.daemon_status(),
            server: ctx.connection.status(),
            build: ctx.pipeline.state(),
            backup: ctx.backups.status(),
        }),

        Request::Start { force } => {
            let started = ctx.connection.start(force).await?;
            Ok(Response::Started {
                auth: started.auth,
                world: started.world,
                started_at_ms: started.started_at_ms,
            })
        }

        Request::Stop {} => {
            let warnings = ctx.connection.stop().await?;
            Ok(Response::Stopped {
                warnings,
                stopped_at_ms: now_millis(),
            })
        }

        Request::LogsTail { lines } => {
            let (lines, truncated) = ctx.logs.tail_server(lines);
            Ok(Response::LogsTail { lines, truncated })
        }

        Request::DaemonLogsTail { lines } => {
            let (lines, truncated) = ctx.logs.tail_daemon(lines);
            Ok(Response::LogsTail { lines, truncated })
        }

        Request::Admin { action } => {
            let command = ctx.dispatcher.dispatch(&action).await?;
            Ok(Response::Dispatched { command })
        }

        Request::Console { command } => {
            let command = ctx.dispatcher.dispatch(&AdminAction::Console { command }).await?;
            Ok(Response::Dispatched { command })
        }

        Request::PlayerInfo { character } => {
            let info = player_info(ctx.database.as_ref(), &character).await?;
            Ok(Response::PlayerInfo(info))
        }

        Request::BannedAccounts {} => Ok(Response::BannedAccounts {
            bans: ctx.database.get_banned_accounts().await?,
        }),

        Request::Sync {} => {
            let handle = ctx.pipeline.sync()?;
            let run = handle.run;
            ctx.publish_run(handle);
            Ok(Response::BuildStarted {
                run,
                kind: RunKind::Sync,
            })
        }

        Request::Compile {
            platform,
            sync_first,
        } => {
            let request = CompileRequest {
                platform: platform.unwrap_or(ctx.default_platform),
                sync_first,
            };
            match ctx.pipeline.compile(request)? {
                Submitted::Started(handle) => {
                    let run = handle.run;
                    ctx.publish_run(handle);
                    Ok(Response::BuildStarted {
                        run,
                        kind: RunKind::Compile,
                    })
                }
                Submitted::CancelledPrior { run } => Ok(Response::BuildCancelled { run }),
            }
        }

        Request::CancelBuild {} => {
            let run = ctx.pipeline.cancel()?.ok_or(CoreError::NothingToCancel)?;
            Ok(Response::BuildCancelled { run })
        }

        Request::BackupSchedule { schedule } => Ok(Response::BackupStatus(ctx.backups.apply(schedule)?)),

        Request::BackupNow { stores } => {
            let stores = if stores.is_empty() {
                ctx.backups.status().schedule.enabled_stores()
            } else {
                stores
            };
            if stores.is_empty() {
                return Err(CoreError::InvalidConfig("no backup store selected".to_string()));
            }
            ctx.backups.trigger(&stores);
            Ok(Response::BackupTriggered { stores })
        }

        Request::BackupStatus {} => Ok(Response::BackupStatus(ctx.backups.status())),

        Request::Subscribe { .. } | Request::Unsubscribe {} | Request::Shutdown {} => Err(
            CoreError::Internal("connection request reached the request handler".to_string()),
        ),
    }
}

/// Per-connection event feed filtered to the requested topics.
struct Subscription {
    topics: Vec<Topic>,
    logs: Option<broadcast::Receiver<LogLine>>,
    daemon_logs: Option<broadcast::Receiver<LogLine>>,
    events: broadcast::Receiver<Event>,
}

impl Subscription {
    fn new(ctx: &Context, topics: Vec<Topic>) -> Self {
        let logs = topics
            .contains(&Topic::Logs)
            .then(|| ctx.logs.server_subscribe());
        let daemon_logs = topics
            .contains(&Topic::DaemonLogs)
            .then(|| ctx.logs.daemon_subscribe());
        Self {
            topics,
            logs,
            daemon_logs,
            events: ctx.events.subscribe(),
        }
    }

    /// Slow readers skip what they missed rather than ending the feed.
    async fn next(&mut self) -> Option<Event> {
        loop {
            let received = tokio::select! {
                line = recv_line(&mut self.logs) => line.map(Event::Log),
                line = recv_line(&mut self.daemon_logs) => line.map(Event::DaemonLog),
                event = self.events.recv() => event,
            };
            match received {
                Ok(event) if self.topics.contains(&event.topic()) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("subscriber lagged, skipped {skipped} events");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

async fn recv_line(rx: &mut Option<broadcast::Receiver<LogLine>>) -> Result<LogLine, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<Event> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
