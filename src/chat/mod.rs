//! Slash-command interpreter for inbound chat messages.

pub mod commands;
pub mod interpreter;

pub use commands::{ChatCommand, CommandRegistry};
pub use interpreter::{CommandInterpreter, ParsedCommand};
