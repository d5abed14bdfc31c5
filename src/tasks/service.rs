//! Owner-checked task operations used by the web API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{Task, TaskDraft, TaskView};
use super::queries::TaskQueries;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::settings::SettingsResolver;
use crate::store::Database;

/// Raw create/edit input as submitted by a client.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TaskInput {
    pub description: String,
    /// Wall-clock due time in the user's zone, `YYYY-MM-DD - HH:MM:SS`.
    pub due_on: String,
}

/// Task operations on behalf of a signed-in identity.
#[derive(Clone)]
pub struct TaskService {
    db: Arc<dyn Database>,
    queries: TaskQueries,
    settings: Arc<SettingsResolver>,
}

impl TaskService {
    pub fn new(db: Arc<dyn Database>, settings: Arc<SettingsResolver>) -> Self {
        Self {
            queries: TaskQueries::new(Arc::clone(&db)),
            db,
            settings,
        }
    }

    async fn zone_for(&self, identity: &Identity) -> Result<String> {
        Ok(self.settings.get_or_create(identity).await?.timezone)
    }

    /// Create a task from local-time input.
    pub async fn create(&self, identity: &Identity, input: &TaskInput) -> Result<TaskView> {
        let zone = self.zone_for(identity).await?;
        let draft = TaskDraft::from_input(&input.description, &input.due_on, &zone)?;
        let task = Task::new(identity.key.clone(), draft);
        self.db.insert_task(&task).await?;
        info!(task_id = %task.id, owner = %identity.key, due_on = %task.due_on, "Task created");
        TaskView::render(&task, &zone)
    }

    /// Fetch a task, enforcing ownership.
    pub async fn get(&self, identity: &Identity, id: Uuid) -> Result<Task> {
        let task = self
            .db
            .get_task(id)
            .await?
            .ok_or_else(|| Error::not_found("task", id))?;
        if !task.is_owned_by(&identity.key) {
            warn!(task_id = %id, owner = %task.owner, caller = %identity.key, "Rejected access to foreign task");
            return Err(Error::forbidden("task", id));
        }
        Ok(task)
    }

    /// Fetch a task rendered in the owner's zone.
    pub async fn view(&self, identity: &Identity, id: Uuid) -> Result<TaskView> {
        let task = self.get(identity, id).await?;
        TaskView::render(&task, &self.zone_for(identity).await?)
    }

    /// Replace description and due time of an owned task.
    pub async fn edit(&self, identity: &Identity, id: Uuid, input: &TaskInput) -> Result<TaskView> {
        let mut task = self.get(identity, id).await?;
        let zone = self.zone_for(identity).await?;
        let draft = TaskDraft::from_input(&input.description, &input.due_on, &zone)?;
        task.apply(draft);
        self.db.update_task(&task).await?;
        info!(task_id = %id, owner = %identity.key, "Task edited");
        TaskView::render(&task, &zone)
    }

    /// Delete an owned task.
    pub async fn delete(&self, identity: &Identity, id: Uuid) -> Result<()> {
        self.get(identity, id).await?;
        if !self.db.delete_task(id).await? {
            return Err(Error::not_found("task", id));
        }
        info!(task_id = %id, owner = %identity.key, "Task deleted");
        Ok(())
    }

    /// Unfinished tasks of the caller.
    pub async fn list(&self, identity: &Identity, include_finished: bool) -> Result<Vec<TaskView>> {
        let zone = self.zone_for(identity).await?;
        self.queries
            .tasks_by_owner(&identity.key, include_finished)
            .await?
            .iter()
            .map(|t| TaskView::render(t, &zone))
            .collect()
    }

    /// The caller's tasks due on their local today.
    pub async fn today(&self, identity: &Identity, now: DateTime<Utc>) -> Result<Vec<TaskView>> {
        let zone = self.zone_for(identity).await?;
        self.queries
            .tasks_due_today(&identity.key, &zone, now)
            .await?
            .iter()
            .map(|t| TaskView::render(t, &zone))
            .collect()
    }
}
