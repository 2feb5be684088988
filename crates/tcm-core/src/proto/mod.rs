mod admin;
mod error;
mod player;
mod rpc;
mod types;

pub use admin::AdminAction;
pub use error::{ErrorCode, RpcError};
pub use player::{AccountBan, GmLevel, Money, PlayerInfo};
pub use rpc::*;
pub use types::*;
