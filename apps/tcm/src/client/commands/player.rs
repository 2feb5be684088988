use anyhow::Result;
use tcm_core::proto::{AccountBan, PlayerInfo, Request, Response};

use crate::client::{unexpected, Daemon};

pub async fn player_info(character: String) -> Result<PlayerInfo> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::PlayerInfo { character }).await? {
        Response::PlayerInfo(info) => Ok(info),
        other => Err(unexpected(other)),
    }
}

pub async fn banned_accounts() -> Result<Vec<AccountBan>> {
    let mut daemon = Daemon::connect().await?;
    match daemon.call(Request::BannedAccounts {}).await? {
        Response::BannedAccounts { bans } => Ok(bans),
        other => Err(unexpected(other)),
    }
}
