use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tcm_core::proto::{BackupSchedule, ConnectionMode, Platform, ServiceKind};

const SETTINGS_ENV: &str = "TCM_SETTINGS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub remote: RemoteSettings,
    pub build: BuildSettings,
    pub database: DatabaseSettings,
    pub backup: BackupSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub mode: ConnectionMode,
    /// Folder holding the authserver and worldserver executables.
    pub folder: PathBuf,
    pub auth_executable: Option<String>,
    pub world_executable: Option<String>,
    /// Written to the world console before the process is killed.
    pub shutdown_command: String,
    pub stop_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Local,
            folder: PathBuf::new(),
            auth_executable: None,
            world_executable: None,
            shutdown_command: "server shutdown 0".to_string(),
            stop_grace_secs: 30,
        }
    }
}

impl ServerSettings {
    pub fn executable(&self, service: ServiceKind) -> PathBuf {
        let configured = match service {
            ServiceKind::Auth => self.auth_executable.as_deref(),
            ServiceKind::World => self.world_executable.as_deref(),
        };
        self.folder
            .join(configured.unwrap_or_else(|| service.executable_name()))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Remote-access host; read from `worldserver.conf` in the server folder when unset.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth_port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout_secs: u64,
    pub probe_interval_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            auth_port: 3724,
            username: String::new(),
            password: String::new(),
            connect_timeout_secs: 5,
            probe_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub source_root: Option<PathBuf>,
    pub repository: String,
    pub branch: String,
    pub platform: Platform,
    pub git: PathBuf,
    pub cmake: PathBuf,
    pub cmake_args: Vec<String>,
    /// Parent of per-run scratch directories; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    pub artifact_dir: PathBuf,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            source_root: None,
            repository: "https://github.com/TrinityCore/TrinityCore.git".to_string(),
            branch: "3.3.5".to_string(),
            platform: Platform::default(),
            git: PathBuf::from("git"),
            cmake: PathBuf::from("cmake"),
            cmake_args: Vec::new(),
            scratch_dir: None,
            artifact_dir: Path::new("bin").join("Release"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub auth: String,
    pub characters: String,
    pub world: String,
    pub mysql: PathBuf,
    pub mysqldump: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: "trinity".to_string(),
            password: "trinity".to_string(),
            auth: "auth".to_string(),
            characters: "characters".to_string(),
            world: "world".to_string(),
            mysql: PathBuf::from("mysql"),
            mysqldump: PathBuf::from("mysqldump"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    #[serde(flatten)]
    pub schedule: BackupSchedule,
    pub directory: Option<PathBuf>,
}

impl BackupSettings {
    pub fn directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| data_dir().unwrap_or_else(std::env::temp_dir).join("tcm").join("backups"))
    }
}

/// Load the daemon settings. A missing file yields the defaults.
pub fn load_settings() -> Result<Settings, String> {
    let path = settings_path()?;
    load_settings_from(&path)
}

pub fn load_settings_from(path: &Path) -> Result<Settings, String> {
    let content = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(err) => return Err(format!("Failed to read {}: {err}", path.display())),
    };

    serde_json::from_str::<Settings>(&content)
        .map_err(|err| format!("Failed to parse {}: {err}", path.display()))
}

pub fn settings_path() -> Result<PathBuf, String> {
    if let Some(path) = std::env::var_os(SETTINGS_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join("settings.json"))
}

fn config_dir() -> Result<PathBuf, String> {
    if let Some(base) = dirs::data_dir() {
        return Ok(base.join("tcm").join("tcmd"));
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".tcm").join("tcmd"));
    }
    Err("Unable to resolve a data directory".to_string())
}

fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().or_else(|| dirs::home_dir().map(|home| home.join(".tcm")))
}
