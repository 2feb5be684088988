use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub type RequestId = u64;
pub type UnixMillis = u64;
pub type RunId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// One of the two cooperating server processes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Auth,
    World,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 2] = [ServiceKind::Auth, ServiceKind::World];

    pub fn executable_name(self) -> &'static str {
        match (self, cfg!(windows)) {
            (ServiceKind::Auth, true) => "authserver.exe",
            (ServiceKind::Auth, false) => "authserver",
            (ServiceKind::World, true) => "worldserver.exe",
            (ServiceKind::World, false) => "worldserver",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Auth => f.write_str("authserver"),
            ServiceKind::World => f.write_str("worldserver"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub at_ms: UnixMillis,
    pub stream: LogStream,
    #[serde(default)]
    pub service: Option<ServiceKind>,
    pub line: String,
}

/// Target word size of a build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    X86,
    #[default]
    X64,
}

impl Platform {
    pub fn is_64_bit(self) -> bool {
        matches!(self, Platform::X64)
    }

    /// Whether the current host can run binaries built for this platform.
    pub fn supported_by_host(self) -> bool {
        !self.is_64_bit() || cfg!(target_pointer_width = "64")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::X86 => f.write_str("x86"),
            Platform::X64 => f.write_str("x64"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x86" | "win32" | "32" | "i686" => Ok(Platform::X86),
            "x64" | "64" | "x86_64" | "amd64" => Ok(Platform::X64),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// One of the three independently backed-up databases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum BackupStore {
    Auth,
    Characters,
    World,
}

impl BackupStore {
    pub const ALL: [BackupStore; 3] = [BackupStore::Auth, BackupStore::Characters, BackupStore::World];
}

impl fmt::Display for BackupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupStore::Auth => f.write_str("auth"),
            BackupStore::Characters => f.write_str("characters"),
            BackupStore::World => f.write_str("world"),
        }
    }
}

impl FromStr for BackupStore {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auth" => Ok(BackupStore::Auth),
            "characters" | "chars" => Ok(BackupStore::Characters),
            "world" => Ok(BackupStore::World),
            other => Err(format!("unknown backup store: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupSchedule {
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub characters: bool,
    #[serde(default)]
    pub world: bool,
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub hours: u32,
    #[serde(default)]
    pub minutes: u32,
}

impl BackupSchedule {
    pub fn is_active(&self) -> bool {
        self.auth || self.characters || self.world
    }

    pub fn enabled_stores(&self) -> Vec<BackupStore> {
        BackupStore::ALL
            .into_iter()
            .filter(|store| match store {
                BackupStore::Auth => self.auth,
                BackupStore::Characters => self.characters,
                BackupStore::World => self.world,
            })
            .collect()
    }

    pub fn interval(&self) -> Duration {
        let minutes = u64::from(self.days) * 24 * 60 + u64::from(self.hours) * 60 + u64::from(self.minutes);
        Duration::from_secs(minutes * 60)
    }
}

/// Render a duration as "1 day, 2 hours, 3 minutes, 4 seconds", skipping zero units.
pub fn readable_duration(total_secs: u64) -> String {
    let units = [
        (total_secs / 86_400, "day"),
        (total_secs % 86_400 / 3_600, "hour"),
        (total_secs % 3_600 / 60, "minute"),
        (total_secs % 60, "second"),
    ];

    let parts: Vec<String> = units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            if *value == 1 {
                format!("{value} {unit}")
            } else {
                format!("{value} {unit}s")
            }
        })
        .collect();

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(", ")
    }
}
