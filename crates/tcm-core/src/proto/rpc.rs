use serde::{Deserialize, Serialize};

use super::{
    AccountBan, AdminAction, BackupSchedule, BackupStore, LogLine, PlayerInfo, Platform, RequestId,
    RpcError, RunId, ServiceKind, UnixMillis,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    Log(LogLine),
    DaemonLog(LogLine),
    Status(ServerStatus),
    Lifecycle(LifecycleEvent),
    Build(BuildEvent),
    Backup(BackupEvent),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::Log(_) => Topic::Logs,
            Event::DaemonLog(_) => Topic::DaemonLogs,
            Event::Status(_) => Topic::Status,
            Event::Lifecycle(_) => Topic::Lifecycle,
            Event::Build(_) => Topic::Build,
            Event::Backup(_) => Topic::Backup,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Outbound {
    Response(Envelope<Response>),
    Event(Event),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: RequestId,
    pub payload: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Request {
    Ping { client_version: String, protocol_version: u32 },

    Status {},

    Start {
        #[serde(default)]
        force: bool,
    },

    Stop {},

    Shutdown {},

    LogsTail { lines: usize },

    DaemonLogsTail { lines: usize },

    Subscribe { topics: Vec<Topic> },

    Unsubscribe {},

    Admin { action: AdminAction },

    Console { command: String },

    PlayerInfo { character: String },

    BannedAccounts {},

    Sync {},

    Compile {
        #[serde(default)]
        platform: Option<Platform>,
        #[serde(default)]
        sync_first: bool,
    },

    CancelBuild {},

    BackupSchedule { schedule: BackupSchedule },

    BackupNow { stores: Vec<BackupStore> },

    BackupStatus {},
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Topic {
    Logs,
    DaemonLogs,
    Status,
    Lifecycle,
    Build,
    Backup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    Pong { daemon_version: String, protocol_version: u32 },

    Status {
        daemon: DaemonStatus,
        server: ServerStatus,
        build: PipelineState,
        backup: BackupStatus,
    },

    Started { auth: ClientStatus, world: ClientStatus, started_at_ms: UnixMillis },
    Stopped { warnings: Vec<String>, stopped_at_ms: UnixMillis },

    LogsTail { lines: Vec<LogLine>, truncated: bool },

    Subscribed { topics: Vec<Topic> },
    Unsubscribed {},

    ShutdownAck {},

    Dispatched { command: String },

    PlayerInfo(PlayerInfo),
    BannedAccounts { bans: Vec<AccountBan> },

    BuildStarted { run: RunId, kind: RunKind },
    BuildCancelled { run: RunId },

    BackupStatus(BackupStatus),
    BackupTriggered { stores: Vec<BackupStore> },

    Error(RpcError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub daemon_version: String,
    pub protocol_version: u32,
    pub pid: i32,
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub mode: ConnectionMode,
    pub attached: bool,
    pub online: bool,
    pub auth: Option<ClientStatus>,
    pub world: Option<ClientStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStatus {
    pub service: ServiceKind,
    pub online: bool,
    pub pid: Option<u32>,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    DaemonShuttingDown { at_ms: UnixMillis },
    ServiceStarted { service: ServiceKind, pid: Option<u32>, at_ms: UnixMillis },
    ServiceExited { service: ServiceKind, exit: ExitInfo, at_ms: UnixMillis },
}

/// Pipeline state machine as seen from the outside.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    #[default]
    Idle,
    Syncing,
    Generating,
    Compiling,
    Deploying,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Sync,
    Compile,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildStage {
    Sync,
    Generate,
    Compile,
    Deploy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BuildEvent {
    StageStarted { run: RunId, stage: BuildStage },
    Progress { run: RunId, percent: u8 },
    Output { run: RunId, stage: BuildStage, line: String },
    Finished { run: RunId, outcome: BuildOutcome },
}

impl BuildEvent {
    pub fn run(&self) -> RunId {
        match self {
            BuildEvent::StageStarted { run, .. }
            | BuildEvent::Progress { run, .. }
            | BuildEvent::Output { run, .. }
            | BuildEvent::Finished { run, .. } => *run,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", content = "data")]
pub enum BuildOutcome {
    Succeeded { message: String },
    Failed { stage: BuildStage, message: String },
    Cancelled { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupStatus {
    pub schedule: BackupSchedule,
    pub next_at_ms: Option<UnixMillis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BackupEvent {
    Countdown { next_at_ms: UnixMillis, remaining_secs: u64 },
    Triggered { stores: Vec<BackupStore>, at_ms: UnixMillis },
    Completed { store: BackupStore, path: String },
    Failed { store: BackupStore, message: String },
    Stopped {},
}
