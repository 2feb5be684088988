use std::sync::Arc;

use tcm_core::CoreError;
use tcm_core::proto::AdminAction;
use tracing::info;

use crate::connection::ServerConnection;

/// Turns administrative intents into world console commands.
pub struct CommandDispatcher {
    connection: Arc<ServerConnection>,
}

impl CommandDispatcher {
    pub fn new(connection: Arc<ServerConnection>) -> Self {
        Self { connection }
    }

    /// Send `action` to the world service. Success means the command was
    /// handed to the transport, not that the server applied it.
    pub async fn dispatch(&self, action: &AdminAction) -> Result<String, CoreError> {
        if let Some(character) = action.target_character() {
            validate_character_name(character)?;
        }
        if action.message().is_some_and(|message| message.trim().is_empty()) {
            return Err(CoreError::EmptyMessage);
        }

        let world = self.connection.online_world().ok_or(CoreError::ServerOffline)?;
        let command = action.to_console_command();
        world.send_command(&command).await?;
        info!("dispatched console command: {command}");
        Ok(command)
    }
}

/// Empty names mean nothing was selected; anything but letters is refused
/// before it can reach a console or a query.
pub fn validate_character_name(name: &str) -> Result<&str, CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::NoCharacterSelected);
    }
    if !name.chars().all(char::is_alphabetic) {
        return Err(CoreError::InvalidCharacterName(name.to_string()));
    }
    Ok(name)
}
