mod mysql;

pub use mysql::MysqlCli;

use async_trait::async_trait;
use tcm_core::CoreError;
use tcm_core::proto::{AccountBan, GmLevel, Money, PlayerInfo};

use crate::dispatch::validate_character_name;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterRecord {
    pub name: String,
    pub account_id: u32,
    pub race: u8,
    pub class: u8,
    pub level: u8,
    pub money: u64,
    pub played_secs: u64,
    pub total_kills: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: u32,
    pub username: String,
    pub email: String,
    pub last_ip: String,
    pub last_login: String,
}

/// Typed queries against the auth and character stores.
#[async_trait]
pub trait GameDatabase: Send + Sync {
    async fn get_character(&self, name: &str) -> Result<Option<CharacterRecord>, CoreError>;

    async fn get_account(&self, id: u32) -> Result<Option<AccountRecord>, CoreError>;

    /// Highest access level granted to the account on any realm.
    async fn get_account_access(&self, id: u32) -> Result<u8, CoreError>;

    async fn get_banned_accounts(&self) -> Result<Vec<AccountBan>, CoreError>;
}

pub async fn player_info(database: &dyn GameDatabase, character: &str) -> Result<PlayerInfo, CoreError> {
    let name = validate_character_name(character)?;
    let record = database
        .get_character(name)
        .await?
        .ok_or_else(|| CoreError::Database(format!("character '{name}' not found")))?;
    let account = database
        .get_account(record.account_id)
        .await?
        .ok_or_else(|| CoreError::Database(format!("account {} not found", record.account_id)))?;
    let access = database.get_account_access(record.account_id).await?;

    Ok(PlayerInfo {
        character_name: record.name,
        account_id: account.id,
        account_name: account.username,
        email: account.email,
        last_ip: account.last_ip,
        last_login: account.last_login,
        gm_level: GmLevel::from(access),
        race: race_name(record.race).to_string(),
        class: class_name(record.class).to_string(),
        level: record.level,
        money: Money(record.money),
        played_secs: record.played_secs,
        total_kills: record.total_kills,
    })
}

fn race_name(id: u8) -> &'static str {
    match id {
        1 => "Human",
        2 => "Orc",
        3 => "Dwarf",
        4 => "Night Elf",
        5 => "Undead",
        6 => "Tauren",
        7 => "Gnome",
        8 => "Troll",
        10 => "Blood Elf",
        11 => "Draenei",
        _ => "Unknown",
    }
}

fn class_name(id: u8) -> &'static str {
    match id {
        1 => "Warrior",
        2 => "Paladin",
        3 => "Hunter",
        4 => "Rogue",
        5 => "Priest",
        6 => "Death Knight",
        7 => "Shaman",
        8 => "Mage",
        9 => "Warlock",
        11 => "Druid",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeDatabase {
        queries: AtomicUsize,
    }

    #[async_trait]
    impl GameDatabase for FakeDatabase {
        async fn get_character(&self, name: &str) -> Result<Option<CharacterRecord>, CoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok((name == "Arthas").then(|| CharacterRecord {
                name: "Arthas".into(),
                account_id: 7,
                race: 1,
                class: 6,
                level: 80,
                money: 123_456,
                played_secs: 90_061,
                total_kills: 12,
            }))
        }

        async fn get_account(&self, id: u32) -> Result<Option<AccountRecord>, CoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(Some(AccountRecord {
                id,
                username: "LICHKING".into(),
                email: "arthas@example.org".into(),
                last_ip: "127.0.0.1".into(),
                last_login: "2026-10-01 12:00:00".into(),
            }))
        }

        async fn get_account_access(&self, _id: u32) -> Result<u8, CoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(3)
        }

        async fn get_banned_accounts(&self) -> Result<Vec<AccountBan>, CoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn player_info_joins_character_and_account() {
        let database = FakeDatabase::default();
        let info = player_info(&database, "Arthas").await.unwrap();

        assert_eq!(info.account_name, "LICHKING");
        assert_eq!(info.gm_level, GmLevel::HeadGm);
        assert_eq!(info.race, "Human");
        assert_eq!(info.class, "Death Knight");
        assert_eq!(info.money.to_string(), "12 Gold 34 Silver 56 Copper");
    }

    #[tokio::test]
    async fn unknown_character_is_a_database_error() {
        let database = FakeDatabase::default();
        assert!(matches!(
            player_info(&database, "Nobody").await,
            Err(CoreError::Database(_))
        ));
    }

    #[tokio::test]
    async fn empty_selection_never_queries() {
        let database = FakeDatabase::default();
        assert!(matches!(
            player_info(&database, "").await,
            Err(CoreError::NoCharacterSelected)
        ));
        assert_eq!(database.queries.load(Ordering::SeqCst), 0);
    }
}
