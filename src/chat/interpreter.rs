//! Routes an inbound chat message to the matching command.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::commands::{self, CommandRegistry};
use crate::settings::model::normalize_address;
use crate::settings::{SettingsResolver, UserSettings};

/// A message split into command name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub name: String,
    pub args: Vec<&'a str>,
}

impl<'a> ParsedCommand<'a> {
    /// Parse `/name arg ...`. Returns `None` when the text is not a command.
    ///
    /// Arguments of one character or less are dropped.
    pub fn parse(body: &'a str) -> Option<Self> {
        let mut tokens = body.split_whitespace();
        let name = tokens.next()?.strip_prefix('/')?;
        if name.is_empty() {
            return None;
        }
        let args = tokens.filter(|t| t.chars().count() > 1).collect();
        Some(Self {
            name: name.to_lowercase(),
            args,
        })
    }
}

/// Answers chat messages on behalf of the user linked to the sender address.
pub struct CommandInterpreter {
    registry: CommandRegistry,
    settings: Arc<SettingsResolver>,
}

impl CommandInterpreter {
    pub fn new(registry: CommandRegistry, settings: Arc<SettingsResolver>) -> Self {
        Self { registry, settings }
    }

    /// Produce the reply for `body` sent from chat address `sender`.
    ///
    /// Returns `None` when the sender is not linked to any account; nothing
    /// is sent back to unknown addresses. Errors are logged and answered with
    /// the help text.
    pub async fn handle(&self, sender: &str, body: &str) -> Option<String> {
        let address = normalize_address(sender);
        let settings = match self.settings.find_by_chat_address(&address).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                info!(sender = %address, "Ignoring chat message from unregistered address");
                return None;
            }
            Err(e) => {
                warn!(sender = %address, error = %e, "Failed to resolve chat sender");
                return None;
            }
        };
        Some(self.reply(&settings, body).await)
    }

    async fn reply(&self, settings: &UserSettings, body: &str) -> String {
        let Some(parsed) = ParsedCommand::parse(body) else {
            return commands::HELP_TEXT.to_string();
        };
        let name = parsed.name.as_str();

        let command = self.registry.get(name);
        let needs_verification = command
            .as_ref()
            .is_none_or(|c| c.requires_verification());
        if needs_verification && !settings.verified {
            debug!(owner = %settings.owner, command = %name, "Unverified sender");
            return commands::VERIFY_PROMPT.to_string();
        }

        let Some(command) = command else {
            debug!(owner = %settings.owner, command = %name, "Unknown chat command");
            return commands::HELP_TEXT.to_string();
        };

        match command.execute(settings, &parsed.args).await {
            Ok(reply) => {
                debug!(owner = %settings.owner, command = %name, "Chat command handled");
                reply
            }
            Err(e) => {
                warn!(owner = %settings.owner, command = %name, error = %e, "Chat command failed");
                commands::HELP_TEXT.to_string()
            }
        }
    }
}
