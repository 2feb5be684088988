use clap::{Parser, Subcommand};

use tcm_core::proto::{AdminAction, BackupSchedule, BackupStore, Platform};

mod client;
mod render;

use client::BuildReport;

#[derive(Parser)]
#[command(name = "tcm", about = "TrinityCore operator console")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    Ping,
    /// Stop the daemon. Running game servers are left alone.
    Shutdown,
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Start the auth and world services as a pair.
    Up {
        /// Kill stale server processes without asking.
        #[arg(long)]
        force: bool,
    },
    Down,
    /// Send a raw console command, or open an interactive console.
    Exec {
        #[arg(short = 'i', long = "interactive")]
        interactive: bool,

        command: Vec<String>,
    },
    Announce {
        #[arg(required = true)]
        message: Vec<String>,
    },
    Notify {
        #[arg(required = true)]
        message: Vec<String>,
    },
    Gmnotify {
        #[arg(required = true)]
        message: Vec<String>,
    },
    Kick {
        character: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Revive {
        character: String,
    },
    Rename {
        character: String,
    },
    Ban {
        character: String,
        /// Ban length in console syntax, e.g. 1d, 12h or -1 for permanent.
        duration: String,
        #[arg(required = true)]
        reason: Vec<String>,
    },
    Customize {
        character: String,
    },
    Race {
        character: String,
    },
    Faction {
        character: String,
    },
    Level {
        character: String,
        level: u8,
    },
    /// Character, account and playtime details.
    Info {
        character: String,
    },
    Bans,
    /// Clone or pull the server sources.
    Sync {
        #[arg(long)]
        detach: bool,
    },
    /// Generate, compile and deploy the server. Issuing it while a compile
    /// runs cancels that compile instead.
    Build {
        #[arg(long)]
        platform: Option<Platform>,

        /// Pull the sources before generating.
        #[arg(long)]
        sync: bool,

        #[arg(long)]
        detach: bool,
    },
    Cancel,
    Backup {
        #[command(subcommand)]
        cmd: BackupCmd,
    },
    Logs {
        #[arg(short = 'n', long = "lines", default_value_t = 200)]
        lines: usize,

        #[arg(short = 'f', long = "follow")]
        follow: bool,

        #[arg(long = "daemon-logs")]
        daemon_logs: bool,
    },
}

#[derive(Subcommand)]
enum BackupCmd {
    /// Replace the recurring schedule. No store flags disables it.
    Schedule {
        #[arg(long)]
        auth: bool,
        #[arg(long)]
        characters: bool,
        #[arg(long)]
        world: bool,
        #[arg(long, default_value_t = 0)]
        days: u32,
        #[arg(long, default_value_t = 0)]
        hours: u32,
        #[arg(long, default_value_t = 0)]
        minutes: u32,
    },
    /// Back up now; without stores, the scheduled ones.
    Now { stores: Vec<BackupStore> },
    Status,
    /// Show the countdown and job results as they happen.
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.cmd {
        Cmd::Ping => println!("{}", client::ping().await?),
        Cmd::Shutdown => println!("{}", client::shutdown().await?),
        Cmd::Status { json } => {
            let status = client::status().await?;
            if json {
                let value = serde_json::json!({
                    "daemon": status.daemon,
                    "server": status.server,
                    "build": status.build,
                    "backup": status.backup,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!(
                    "tcmd {} (pid {}, up {})",
                    status.daemon.daemon_version,
                    status.daemon.pid,
                    tcm_core::proto::readable_duration(status.daemon.uptime_ms / 1000)
                );
                render::print_server_status(&status.server);
                println!("build: {:?}", status.build);
                render::print_backup_status(&status.backup);
            }
        }
        Cmd::Up { force } => {
            let started = client::up(force).await?;
            println!("{}", render::client_line(&started.auth));
            println!("{}", render::client_line(&started.world));
            println!("started at {}", started.started_at_ms);
        }
        Cmd::Down => {
            let stopped = client::stop().await?;
            for warning in &stopped.warnings {
                eprintln!("warning: {warning}");
            }
            println!("stopped at {}", stopped.stopped_at_ms);
        }
        Cmd::Exec {
            interactive,
            command,
        } => {
            if interactive {
                client::console_interactive().await?;
            } else if command.is_empty() {
                anyhow::bail!("command required for non-interactive exec");
            } else {
                admin(AdminAction::Console {
                    command: command.join(" "),
                })
                .await?;
            }
        }
        Cmd::Announce { message } => {
            admin(AdminAction::Announce {
                message: message.join(" "),
            })
            .await?
        }
        Cmd::Notify { message } => {
            admin(AdminAction::ServerNotify {
                message: message.join(" "),
            })
            .await?
        }
        Cmd::Gmnotify { message } => {
            admin(AdminAction::GmNotify {
                message: message.join(" "),
            })
            .await?
        }
        Cmd::Kick { character, reason } => admin(AdminAction::Kick { character, reason }).await?,
        Cmd::Revive { character } => admin(AdminAction::Revive { character }).await?,
        Cmd::Rename { character } => admin(AdminAction::ForceRename { character }).await?,
        Cmd::Ban {
            character,
            duration,
            reason,
        } => {
            admin(AdminAction::Ban {
                character,
                duration,
                reason: reason.join(" "),
            })
            .await?
        }
        Cmd::Customize { character } => admin(AdminAction::Customize { character }).await?,
        Cmd::Race { character } => admin(AdminAction::ChangeRace { character }).await?,
        Cmd::Faction { character } => admin(AdminAction::ChangeFaction { character }).await?,
        Cmd::Level { character, level } => admin(AdminAction::SetLevel { character, level }).await?,
        Cmd::Info { character } => render::print_player_info(&client::player_info(character).await?),
        Cmd::Bans => render::print_bans(&client::banned_accounts().await?),
        Cmd::Sync { detach } => report(client::sync(detach).await?)?,
        Cmd::Build {
            platform,
            sync,
            detach,
        } => report(client::compile(platform, sync, detach).await?)?,
        Cmd::Cancel => println!("cancelled run {}", client::cancel_build().await?),
        Cmd::Backup { cmd } => backup(cmd).await?,
        Cmd::Logs {
            lines,
            follow,
            daemon_logs,
        } => {
            if follow {
                client::follow_logs(lines, daemon_logs).await?;
            } else {
                let resp = if daemon_logs {
                    client::daemon_logs_tail(lines).await?
                } else {
                    client::logs_tail(lines).await?
                };
                if resp.truncated {
                    println!("...");
                }
                for line in &resp.lines {
                    render::print_log_line(line);
                }
            }
        }
    }
    Ok(())
}

async fn admin(action: AdminAction) -> anyhow::Result<()> {
    let command = client::dispatch(action).await?;
    println!("sent: {command}");
    Ok(())
}

fn report(report: BuildReport) -> anyhow::Result<()> {
    match report {
        BuildReport::Detached { run } => println!("run {run} started"),
        BuildReport::CancelledPrior { run } => println!("cancelled compile run {run}"),
        BuildReport::Finished { outcome, .. } => {
            if let tcm_core::proto::BuildOutcome::Failed { .. } = outcome {
                anyhow::bail!(render::outcome_text(&outcome));
            }
        }
    }
    Ok(())
}

async fn backup(cmd: BackupCmd) -> anyhow::Result<()> {
    match cmd {
        BackupCmd::Schedule {
            auth,
            characters,
            world,
            days,
            hours,
            minutes,
        } => {
            let status = client::set_schedule(BackupSchedule {
                auth,
                characters,
                world,
                days,
                hours,
                minutes,
            })
            .await?;
            render::print_backup_status(&status);
        }
        BackupCmd::Now { stores } => {
            let mut failed = false;
            client::backup_now(stores, |event| {
                failed |= matches!(event, tcm_core::proto::BackupEvent::Failed { .. });
                println!("{}", render::backup_event_text(event));
            })
            .await?;
            if failed {
                anyhow::bail!("one or more backups failed");
            }
        }
        BackupCmd::Status => render::print_backup_status(&client::backup_status().await?),
        BackupCmd::Watch => {
            client::backup_watch(|event| println!("{}", render::backup_event_text(event))).await?;
        }
    }
    Ok(())
}
