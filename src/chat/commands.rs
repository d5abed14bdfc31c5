//! Chat commands and the registry that maps command names to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::{ConfigError, Error, Result};
use crate::settings::{SettingsResolver, UserSettings};
use crate::store::Database;
use crate::tasks::TaskQueries;
use crate::timezone;

/// Static command reference sent for `/help` and any input we cannot handle.
pub const HELP_TEXT: &str = "Available commands:\n\
/list - show your pending tasks\n\
/delete <task id> - delete one of your tasks\n\
/verify <api key> - link this chat address to your account\n\
/help - show this message";

/// Reply for senders whose address has not been verified.
pub const VERIFY_PROMPT: &str = "This chat address is not verified yet. \
Send /verify <api key> with the API key shown on your settings page.";

pub const NO_TASKS: &str = "You have no pending tasks.";
pub const VERIFY_OK: &str = "Your chat address is now verified. Send /help to see what I can do.";
pub const VERIFY_FAILED: &str = "That API key does not match. Check your settings page and try again.";

/// A chat command handler.
#[async_trait]
pub trait ChatCommand: Send + Sync {
    /// Name without the `/` prefix.
    fn name(&self) -> &str;

    /// Whether the sender must have verified their chat address.
    fn requires_verification(&self) -> bool {
        true
    }

    /// Run the command for `sender` and produce the reply text.
    async fn execute(&self, sender: &UserSettings, args: &[&str]) -> Result<String>;
}

/// Registry of chat commands, keyed by name.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn ChatCommand>>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in command set.
    pub fn builtin(
        db: Arc<dyn Database>,
        settings: Arc<SettingsResolver>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.register(Arc::new(ListCommand::new(Arc::clone(&db))))?;
        registry.register(Arc::new(DeleteCommand::new(db)))?;
        registry.register(Arc::new(VerifyCommand::new(settings)))?;
        registry.register(Arc::new(HelpCommand))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Register a command. Names must be unique.
    pub fn register(&mut self, command: Arc<dyn ChatCommand>) -> std::result::Result<(), ConfigError> {
        let name = command.name().to_lowercase();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                key: "chat command".into(),
                message: format!("invalid command name '{name}'"),
            });
        }
        if self.commands.contains_key(&name) {
            return Err(ConfigError::DuplicateCommand(name));
        }
        tracing::debug!(command = %name, "Registered chat command");
        self.commands.insert(name, command);
        Ok(())
    }

    /// The fallback `help` command must exist.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !self.commands.contains_key("help") {
            return Err(ConfigError::InvalidValue {
                key: "chat command".into(),
                message: "no 'help' command registered".into(),
            });
        }
        Ok(())
    }

    /// Look up a command by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatCommand>> {
        self.commands.get(&name.to_lowercase()).cloned()
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

// ── Built-in commands ───────────────────────────────────────────────

/// `/list`
pub struct ListCommand {
    queries: TaskQueries,
}

impl ListCommand {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            queries: TaskQueries::new(db),
        }
    }
}

#[async_trait]
impl ChatCommand for ListCommand {
    fn name(&self) -> &str {
        "list"
    }

    async fn execute(&self, sender: &UserSettings, _args: &[&str]) -> Result<String> {
        let tasks = self.queries.tasks_by_owner(&sender.owner, false).await?;
        if tasks.is_empty() {
            return Ok(NO_TASKS.to_string());
        }
        let lines = tasks
            .iter()
            .map(|t| {
                let due = timezone::format(t.due_on, &sender.timezone)?;
                Ok(format!("{} - {} ({due})", t.id, t.description))
            })
            .collect::<Result<Vec<String>>>()?;
        Ok(lines.join("\n"))
    }
}

/// `/delete <task id>`
pub struct DeleteCommand {
    db: Arc<dyn Database>,
}

impl DeleteCommand {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatCommand for DeleteCommand {
    fn name(&self) -> &str {
        "delete"
    }

    async fn execute(&self, sender: &UserSettings, args: &[&str]) -> Result<String> {
        let raw = args
            .first()
            .ok_or_else(|| Error::validation("task id", "missing"))?;
        let not_found = || format!("Task {raw} not found.");

        let Ok(id) = Uuid::parse_str(raw) else {
            return Ok(not_found());
        };
        match self.db.get_task(id).await? {
            Some(task) if task.is_owned_by(&sender.owner) => {
                self.db.delete_task(id).await?;
                info!(task_id = %id, owner = %sender.owner, "Task deleted over chat");
                Ok(format!("Task {id} deleted."))
            }
            _ => Ok(not_found()),
        }
    }
}

/// `/verify <api key>`
pub struct VerifyCommand {
    settings: Arc<SettingsResolver>,
}

impl VerifyCommand {
    pub fn new(settings: Arc<SettingsResolver>) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ChatCommand for VerifyCommand {
    fn name(&self) -> &str {
        "verify"
    }

    fn requires_verification(&self) -> bool {
        false
    }

    async fn execute(&self, sender: &UserSettings, args: &[&str]) -> Result<String> {
        let key = args
            .first()
            .ok_or_else(|| Error::validation("api key", "missing"))?;
        match self.settings.verify_chat_address(&sender.chat_address, key).await? {
            Some(_) => Ok(VERIFY_OK.to_string()),
            None => Ok(VERIFY_FAILED.to_string()),
        }
    }
}

/// `/help`
pub struct HelpCommand;

#[async_trait]
impl ChatCommand for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    async fn execute(&self, _sender: &UserSettings, _args: &[&str]) -> Result<String> {
        Ok(HELP_TEXT.to_string())
    }
}
