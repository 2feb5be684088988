use std::process::Stdio;

use async_trait::async_trait;
use tcm_core::CoreError;
use tcm_core::proto::AccountBan;
use tokio::process::Command;
use tracing::debug;

use super::{AccountRecord, CharacterRecord, GameDatabase};
use crate::config::DatabaseSettings;

/// Runs queries through the `mysql` command line client in batch mode.
pub struct MysqlCli {
    settings: DatabaseSettings,
}

impl MysqlCli {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }

    async fn query(&self, database: &str, sql: &str) -> Result<Vec<Vec<String>>, CoreError> {
        debug!("mysql {database}: {sql}");
        let output = Command::new(&self.settings.mysql)
            .arg("--batch")
            .arg("--skip-column-names")
            .arg(format!("--host={}", self.settings.host))
            .arg(format!("--port={}", self.settings.port))
            .arg(format!("--user={}", self.settings.username))
            .arg(format!("--database={database}"))
            .arg("--execute")
            .arg(sql)
            .env("MYSQL_PWD", &self.settings.password)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| {
                CoreError::Database(format!("failed to run {}: {err}", self.settings.mysql.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Database(stderr.trim().to_string()));
        }
        Ok(parse_rows(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl GameDatabase for MysqlCli {
    async fn get_character(&self, name: &str) -> Result<Option<CharacterRecord>, CoreError> {
        // callers pass names validated as letters only
        let sql = format!(
            "SELECT name, account, race, class, level, money, totaltime, totalKills \
             FROM characters WHERE name = '{name}' LIMIT 1"
        );
        let rows = self.query(&self.settings.characters, &sql).await?;
        rows.first().map(|row| character_from_row(row)).transpose()
    }

    async fn get_account(&self, id: u32) -> Result<Option<AccountRecord>, CoreError> {
        let sql = format!("SELECT id, username, email, last_ip, last_login FROM account WHERE id = {id}");
        let rows = self.query(&self.settings.auth, &sql).await?;
        rows.first().map(|row| account_from_row(row)).transpose()
    }

    async fn get_account_access(&self, id: u32) -> Result<u8, CoreError> {
        let sql = format!("SELECT COALESCE(MAX(gmlevel), 0) FROM account_access WHERE id = {id}");
        let rows = self.query(&self.settings.auth, &sql).await?;
        match rows.first().and_then(|row| row.first()) {
            Some(value) => field(value, "gmlevel"),
            None => Ok(0),
        }
    }

    async fn get_banned_accounts(&self) -> Result<Vec<AccountBan>, CoreError> {
        let sql = "SELECT id, bandate, unbandate, bannedby, banreason FROM account_banned \
                   WHERE active = 1 ORDER BY bandate DESC";
        let rows = self.query(&self.settings.auth, sql).await?;
        rows.iter().map(|row| ban_from_row(row)).collect()
    }
}

/// Split `--batch` output: one row per line, tab separated, with `\t`, `\n`
/// and `\\` escaped inside values.
fn parse_rows(stdout: &str) -> Vec<Vec<String>> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').map(unescape).collect())
        .collect()
}

fn unescape(value: &str) -> String {
    if value == "NULL" {
        return String::new();
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn column<'a>(row: &'a [String], index: usize, name: &str) -> Result<&'a str, CoreError> {
    row.get(index)
        .map(String::as_str)
        .ok_or_else(|| CoreError::Database(format!("missing column {name}")))
}

fn field<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, CoreError> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Database(format!("invalid {name}: {value}")))
}

fn character_from_row(row: &[String]) -> Result<CharacterRecord, CoreError> {
    Ok(CharacterRecord {
        name: column(row, 0, "name")?.to_string(),
        account_id: field(column(row, 1, "account")?, "account")?,
        race: field(column(row, 2, "race")?, "race")?,
        class: field(column(row, 3, "class")?, "class")?,
        level: field(column(row, 4, "level")?, "level")?,
        money: field(column(row, 5, "money")?, "money")?,
        played_secs: field(column(row, 6, "totaltime")?, "totaltime")?,
        total_kills: field(column(row, 7, "totalKills")?, "totalKills")?,
    })
}

fn account_from_row(row: &[String]) -> Result<AccountRecord, CoreError> {
    Ok(AccountRecord {
        id: field(column(row, 0, "id")?, "id")?,
        username: column(row, 1, "username")?.to_string(),
        email: column(row, 2, "email")?.to_string(),
        last_ip: column(row, 3, "last_ip")?.to_string(),
        last_login: column(row, 4, "last_login")?.to_string(),
    })
}

fn ban_from_row(row: &[String]) -> Result<AccountBan, CoreError> {
    Ok(AccountBan {
        account_id: field(column(row, 0, "id")?, "id")?,
        banned_at: field(column(row, 1, "bandate")?, "bandate")?,
        unbanned_at: field(column(row, 2, "unbandate")?, "unbandate")?,
        banned_by: column(row, 3, "bannedby")?.to_string(),
        reason: column(row, 4, "banreason")?.to_string(),
    })
}
