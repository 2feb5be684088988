use serde::{Deserialize, Serialize};

/// High-level administrative intents issued against the world service console.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum AdminAction {
    Announce { message: String },
    ServerNotify { message: String },
    GmNotify { message: String },

    Kick {
        character: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Revive { character: String },
    ForceRename { character: String },
    Ban {
        character: String,
        duration: String,
        reason: String,
    },
    Customize { character: String },
    ChangeRace { character: String },
    ChangeFaction { character: String },
    SetLevel { character: String, level: u8 },

    Console { command: String },
}

impl AdminAction {
    /// The character a player-targeted action applies to, `None` for broadcasts
    /// and raw console commands.
    pub fn target_character(&self) -> Option<&str> {
        match self {
            AdminAction::Kick { character, .. }
            | AdminAction::Revive { character }
            | AdminAction::ForceRename { character }
            | AdminAction::Ban { character, .. }
            | AdminAction::Customize { character }
            | AdminAction::ChangeRace { character }
            | AdminAction::ChangeFaction { character }
            | AdminAction::SetLevel { character, .. } => Some(character.as_str()),
            AdminAction::Announce { .. }
            | AdminAction::ServerNotify { .. }
            | AdminAction::GmNotify { .. }
            | AdminAction::Console { .. } => None,
        }
    }

    pub fn is_player_targeted(&self) -> bool {
        self.target_character().is_some()
    }

    /// Free text of broadcasts and raw console commands.
    pub fn message(&self) -> Option<&str> {
        match self {
            AdminAction::Announce { message }
            | AdminAction::ServerNotify { message }
            | AdminAction::GmNotify { message } => Some(message.as_str()),
            AdminAction::Console { command } => Some(command.as_str()),
            _ => None,
        }
    }

    /// Console command line understood by the world service.
    pub fn to_console_command(&self) -> String {
        let name = self.target_character().map(str::trim).unwrap_or_default();
        let command = match self {
            AdminAction::Announce { message } => format!("announce {message}"),
            AdminAction::ServerNotify { message } => format!("notify {message}"),
            AdminAction::GmNotify { message } => format!("gmnotify {message}"),
            AdminAction::Kick { reason, .. } => match reason.as_deref().map(str::trim) {
                Some(reason) if !reason.is_empty() => format!("kick {name} {reason}"),
                _ => format!("kick {name}"),
            },
            AdminAction::Revive { .. } => format!("revive {name}"),
            AdminAction::ForceRename { .. } => format!("character rename {name}"),
            AdminAction::Ban { duration, reason, .. } => {
                format!("ban character {name} {} {}", duration.trim(), reason.trim())
            }
            AdminAction::Customize { .. } => format!("character customize {name}"),
            AdminAction::ChangeRace { .. } => format!("character changerace {name}"),
            AdminAction::ChangeFaction { .. } => format!("character changefaction {name}"),
            AdminAction::SetLevel { level, .. } => format!("character level {name} {level}"),
            AdminAction::Console { command } => command.clone(),
        };

        // one request per line on both transports
        single_line(command.trim())
    }
}

fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_actions_render_character_commands() {
        let action = AdminAction::SetLevel { character: "Arthas".into(), level: 80 };
        assert_eq!(action.to_console_command(), "character level Arthas 80");
        assert_eq!(action.target_character(), Some("Arthas"));

        let ban = AdminAction::Ban {
            character: "Illidan".into(),
            duration: "1d".into(),
            reason: "spam".into(),
        };
        assert_eq!(ban.to_console_command(), "ban character Illidan 1d spam");
    }

    #[test]
    fn broadcasts_are_not_player_targeted() {
        let action = AdminAction::Announce { message: "restart in 5".into() };
        assert!(!action.is_player_targeted());
        assert_eq!(action.to_console_command(), "announce restart in 5");
    }

    #[test]
    fn multi_line_messages_collapse_to_one_command() {
        let action = AdminAction::GmNotify { message: "one\nserver shutdown 0".into() };
        assert_eq!(action.to_console_command(), "gmnotify one server shutdown 0");
    }

    #[test]
    fn padded_character_names_are_trimmed() {
        let action = AdminAction::Revive { character: " Jaina ".into() };
        assert_eq!(action.to_console_command(), "revive Jaina");

        let ban = AdminAction::Ban {
            character: "\tIllidan".into(),
            duration: "1d".into(),
            reason: "spam".into(),
        };
        assert_eq!(ban.to_console_command(), "ban character Illidan 1d spam");
    }

    #[test]
    fn kick_without_reason_omits_trailing_space() {
        let action = AdminAction::Kick { character: "Jaina".into(), reason: Some("  ".into()) };
        assert_eq!(action.to_console_command(), "kick Jaina");
    }
}
