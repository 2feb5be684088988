use serde::{Deserialize, Serialize};
use std::fmt;

/// Character balance in copper.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Money(pub u64);

impl Money {
    pub fn gold(self) -> u64 {
        self.0 / 10_000
    }

    pub fn silver(self) -> u64 {
        self.0 % 10_000 / 100
    }

    pub fn copper(self) -> u64 {
        self.0 % 100
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Gold {} Silver {} Copper", self.gold(), self.silver(), self.copper())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum GmLevel {
    #[default]
    Player,
    Moderator,
    Gm,
    HeadGm,
    Admin,
}

impl From<u8> for GmLevel {
    fn from(value: u8) -> Self {
        match value {
            1 => GmLevel::Moderator,
            2 => GmLevel::Gm,
            3 => GmLevel::HeadGm,
            4.. => GmLevel::Admin,
            0 => GmLevel::Player,
        }
    }
}

impl fmt::Display for GmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GmLevel::Player => "Player",
            GmLevel::Moderator => "Moderator",
            GmLevel::Gm => "GM",
            GmLevel::HeadGm => "Head GM",
            GmLevel::Admin => "Admin",
        };
        f.write_str(label)
    }
}

/// Operator-facing summary of one character and its owning account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub character_name: String,
    pub account_id: u32,
    pub account_name: String,
    pub email: String,
    pub last_ip: String,
    pub last_login: String,
    pub gm_level: GmLevel,
    pub race: String,
    pub class: String,
    pub level: u8,
    pub money: Money,
    pub played_secs: u64,
    pub total_kills: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountBan {
    pub account_id: u32,
    pub banned_at: u64,
    pub unbanned_at: u64,
    pub banned_by: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_splits_into_denominations() {
        assert_eq!(Money(123_456).to_string(), "12 Gold 34 Silver 56 Copper");
        assert_eq!(Money(99).to_string(), "0 Gold 0 Silver 99 Copper");
        assert_eq!(Money(10_000).to_string(), "1 Gold 0 Silver 0 Copper");
    }

    #[test]
    fn gm_levels_above_admin_clamp() {
        assert_eq!(GmLevel::from(3).to_string(), "Head GM");
        assert_eq!(GmLevel::from(9), GmLevel::Admin);
        assert_eq!(GmLevel::from(0).to_string(), "Player");
    }
}
