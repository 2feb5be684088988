use std::sync::Arc;

use tcm_build::{
    BuildToolchain, CmakeToolchain, GitRepository, Pipeline, PipelineConfig, RunHandle, SourceRepository,
};
use tcm_core::proto::{DaemonStatus, Event, Platform};
use tcm_core::{CoreError, PROTOCOL_VERSION, pkg_version};
use tcm_utils::now_millis;
use tokio::sync::broadcast;
use tracing::warn;

use crate::backup::{BackupJob, BackupScheduler, MysqldumpJob};
use crate::config::Settings;
use crate::connection::ServerConnection;
use crate::database::{GameDatabase, MysqlCli};
use crate::dispatch::CommandDispatcher;
use crate::logs::LogStore;

const EVENT_CAPACITY: usize = 1024;

/// The external tools the daemon drives.
pub struct Collaborators {
    pub database: Arc<dyn GameDatabase>,
    pub backup_job: Arc<dyn BackupJob>,
    pub repository: Arc<dyn SourceRepository>,
    pub toolchain: Arc<dyn BuildToolchain>,
}

impl Collaborators {
    pub fn from_settings(settings: &Settings) -> Self {
        let build = &settings.build;
        Self {
            database: Arc::new(MysqlCli::new(settings.database.clone())),
            backup_job: Arc::new(MysqldumpJob::new(
                settings.database.clone(),
                settings.backup.directory(),
            )),
            repository: Arc::new(GitRepository::new(
                build.git.clone(),
                build.repository.clone(),
                build.branch.clone(),
            )),
            toolchain: Arc::new(CmakeToolchain::new(build.cmake.clone(), build.cmake_args.clone())),
        }
    }
}

/// Everything a request handler needs, built once at startup and shared.
pub struct Context {
    pub logs: LogStore,
    pub events: broadcast::Sender<Event>,
    pub connection: Arc<ServerConnection>,
    pub dispatcher: CommandDispatcher,
    pub pipeline: Pipeline,
    pub backups: BackupScheduler,
    pub database: Arc<dyn GameDatabase>,
    pub default_platform: Platform,
    started_at_ms: u64,
}

impl Context {
    /// Must run inside the tokio runtime; an active backup schedule starts
    /// counting down immediately.
    pub fn new(settings: Settings, logs: LogStore, collaborators: Collaborators) -> Result<Self, CoreError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let connection = Arc::new(ServerConnection::new(
            settings.server.clone(),
            settings.remote.clone(),
            logs.clone(),
            events.clone(),
        ));
        let dispatcher = CommandDispatcher::new(connection.clone());

        let pipeline = Pipeline::new(
            PipelineConfig {
                source_root: settings.build.source_root.clone(),
                server_folder: settings.server.folder.clone(),
                scratch_base: settings
                    .build
                    .scratch_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
                artifact_dir: settings.build.artifact_dir.clone(),
            },
            collaborators.repository,
            collaborators.toolchain,
        );

        let backups = BackupScheduler::new(collaborators.backup_job, events.clone());
        backups.apply(settings.backup.schedule.clone())?;

        Ok(Self {
            logs,
            events,
            connection,
            dispatcher,
            pipeline,
            backups,
            database: collaborators.database,
            default_platform: settings.build.platform,
            started_at_ms: now_millis(),
        })
    }

    pub fn daemon_status(&self) -> DaemonStatus {
        DaemonStatus {
            daemon_version: pkg_version().to_string(),
            protocol_version: PROTOCOL_VERSION,
            pid: std::process::id() as i32,
            uptime_ms: now_millis().saturating_sub(self.started_at_ms),
        }
    }

    /// Forward a run's events to subscribers until it finishes.
    pub fn publish_run(&self, mut handle: RunHandle) {
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = handle.events.recv().await {
                let _ = events.send(Event::Build(event));
            }
            if let Err(err) = handle.task.await {
                warn!("build run {} ended abnormally: {err}", handle.run);
            }
        });
    }
}
