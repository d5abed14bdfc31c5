//! The async `Database` interface for task and settings persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::settings::model::UserSettings;
use crate::tasks::model::Task;

/// Backend-agnostic persistence for tasks and user settings.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Tasks ───────────────────────────────────────────────────────

    /// Insert a new task.
    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Get a task by ID.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError>;

    /// Persist description and due time of an existing task.
    /// `finished` and `created_on` are never written by this call.
    async fn update_task(&self, task: &Task) -> Result<(), DatabaseError>;

    /// Delete a task. Returns whether a row was removed.
    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Flip `finished` from false to true.
    ///
    /// Returns `true` only for the call that performed the transition, so two
    /// callers racing on the same task cannot both claim it.
    async fn mark_task_finished(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Tasks of one owner, ordered by due time.
    async fn list_tasks_by_owner(
        &self,
        owner: &str,
        include_finished: bool,
    ) -> Result<Vec<Task>, DatabaseError>;

    /// Unfinished tasks of one owner with `start <= due_on <= end`, ordered
    /// by due time, at most `limit`.
    async fn list_tasks_in_range(
        &self,
        owner: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, DatabaseError>;

    /// Unfinished tasks of every owner with `due_on <= now`.
    async fn list_due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Settings for one owner.
    async fn get_settings(&self, owner: &str) -> Result<Option<UserSettings>, DatabaseError>;

    /// Every settings record claiming the (normalized) chat address
    /// `address`, verified records first, then by owner.
    async fn list_settings_by_chat_address(
        &self,
        address: &str,
    ) -> Result<Vec<UserSettings>, DatabaseError>;

    /// Insert settings for a new owner. Fails with `Constraint` if the owner
    /// already has a record.
    async fn insert_settings(&self, settings: &UserSettings) -> Result<(), DatabaseError>;

    /// Overwrite the settings record of `settings.owner`.
    async fn update_settings(&self, settings: &UserSettings) -> Result<(), DatabaseError>;
}
