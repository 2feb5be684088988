use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tcm_core::proto::BackupStore;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::DatabaseSettings;

/// Produces one backup of one store.
#[async_trait]
pub trait BackupJob: Send + Sync {
    async fn run(&self, store: BackupStore) -> Result<PathBuf, String>;
}

/// Dumps a store with `mysqldump` into a timestamped `.sql` file.
pub struct MysqldumpJob {
    database: DatabaseSettings,
    directory: PathBuf,
}

impl MysqldumpJob {
    pub fn new(database: DatabaseSettings, directory: PathBuf) -> Self {
        Self { database, directory }
    }

    fn database_name(&self, store: BackupStore) -> &str {
        match store {
            BackupStore::Auth => &self.database.auth,
            BackupStore::Characters => &self.database.characters,
            BackupStore::World => &self.database.world,
        }
    }
}

#[async_trait]
impl BackupJob for MysqldumpJob {
    async fn run(&self, store: BackupStore) -> Result<PathBuf, String> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| format!("create backup dir failed: {}", e))?;

        let target = self.directory.join(dump_file_name(store, Local::now()));
        let partial = target.with_extension("sql.tmp");

        let output = Command::new(&self.database.mysqldump)
            .arg(format!("--host={}", self.database.host))
            .arg(format!("--port={}", self.database.port))
            .arg(format!("--user={}", self.database.username))
            .arg("--single-transaction")
            .arg(format!("--result-file={}", partial.display()))
            .arg(self.database_name(store))
            .env("MYSQL_PWD", &self.database.password)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.database.mysqldump.display(), e))?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&partial).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("{store} backup failed: {}", stderr.trim());
            return Err(format!("mysqldump exited with {}: {}", output.status, stderr.trim()));
        }

        publish(&partial, &target).await?;
        info!("{store} backup created: {}", target.display());
        Ok(target)
    }
}

async fn publish(partial: &Path, target: &Path) -> Result<(), String> {
    tokio::fs::rename(partial, target)
        .await
        .map_err(|e| format!("rename {} failed: {}", partial.display(), e))
}

pub fn dump_file_name(store: BackupStore, at: DateTime<Local>) -> String {
    format!("{store}-{}.sql", at.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn file_name_carries_store_and_timestamp() {
        let at = Local.with_ymd_and_hms(2026, 3, 9, 4, 5, 6).unwrap();
        assert_eq!(dump_file_name(BackupStore::Characters, at), "characters-20260309-040506.sql");
    }

    #[cfg(unix)]
    fn fake_mysqldump(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("mysqldump");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dump_lands_in_the_backup_directory() {
        let dir = tempfile::tempdir().unwrap();
        // write "-- <database>" into the --result-file argument
        let tool = fake_mysqldump(
            dir.path(),
            r#"for arg in "$@"; do case "$arg" in --result-file=*) out="${arg#--result-file=}";; esac; last="$arg"; done
echo "-- $last" > "$out""#,
        );
        let job = MysqldumpJob::new(
            DatabaseSettings {
                mysqldump: tool,
                ..DatabaseSettings::default()
            },
            dir.path().join("backups"),
        );

        let path = job.run(BackupStore::World).await.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("world-"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "-- world\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_dump_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_mysqldump(dir.path(), "echo 'Access denied' >&2\nexit 2");
        let job = MysqldumpJob::new(
            DatabaseSettings {
                mysqldump: tool,
                ..DatabaseSettings::default()
            },
            dir.path().join("backups"),
        );

        let err = job.run(BackupStore::Auth).await.unwrap_err();
        assert!(err.contains("Access denied"));
        let leftovers = std::fs::read_dir(dir.path().join("backups")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
