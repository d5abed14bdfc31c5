//! Per-user notification settings and their resolver.

pub mod model;
pub mod resolver;

pub use model::{SettingsUpdate, SettingsView, UserSettings};
pub use resolver::{ResolverConfig, SettingsResolver};
