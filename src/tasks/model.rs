//! Task data model and the typed draft used for create/edit input.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::timezone;

/// Longest description accepted for a task.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// A single reminder task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique ID.
    pub id: Uuid,
    /// What to be reminded about.
    pub description: String,
    /// When the reminder fires. Always UTC.
    pub due_on: DateTime<Utc>,
    /// When the task was created.
    pub created_on: DateTime<Utc>,
    /// Identity key of the owner.
    pub owner: String,
    /// Set once the reminder has been sent. Never reverts.
    pub finished: bool,
}

impl Task {
    /// Create a new unfinished task from a validated draft.
    pub fn new(owner: impl Into<String>, draft: TaskDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: draft.description,
            due_on: draft.due_on,
            created_on: Utc::now(),
            owner: owner.into(),
            finished: false,
        }
    }

    /// Whether `owner` may read or change this task.
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }

    /// Due if unfinished and `due_on <= now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.finished && self.due_on <= now
    }

    /// Copy the editable fields of a draft onto this task.
    pub fn apply(&mut self, draft: TaskDraft) {
        self.description = draft.description;
        self.due_on = draft.due_on;
    }
}

/// Validated user input for creating or editing a task.
///
/// Only `description` and `due_on` are user-editable; ownership, creation
/// time and completion state never come from input.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub description: String,
    /// Already converted to UTC.
    pub due_on: DateTime<Utc>,
}

impl TaskDraft {
    /// Validate a description and a wall-clock due time entered in `zone`.
    pub fn new(description: &str, due_on_local: NaiveDateTime, zone: &str) -> Result<Self> {
        let description = description.trim();
        if description.is_empty() {
            return Err(Error::validation("description", "must not be empty"));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::validation(
                "description",
                format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
            ));
        }
        Ok(Self {
            description: description.to_string(),
            due_on: timezone::to_utc(due_on_local, zone)?,
        })
    }

    /// Build a draft from raw form text (`YYYY-MM-DD - HH:MM:SS` due time).
    pub fn from_input(description: &str, due_on: &str, zone: &str) -> Result<Self> {
        let local = timezone::parse_local(due_on)?;
        Self::new(description, local, zone)
    }
}

/// Task as shown to its owner, with the due time rendered in their zone.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: Uuid,
    pub description: String,
    pub due_on: DateTime<Utc>,
    pub due_on_local: String,
    pub created_on: DateTime<Utc>,
    pub finished: bool,
}

impl TaskView {
    pub fn render(task: &Task, zone: &str) -> Result<Self> {
        Ok(Self {
            id: task.id,
            description: task.description.clone(),
            due_on: task.due_on,
            due_on_local: timezone::format(task.due_on, zone)?,
            created_on: task.created_on,
            finished: task.finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_converts_to_utc() {
        let draft =
            TaskDraft::from_input("Pay rent", "2024-01-01 - 09:00:00", "America/Sao_Paulo").unwrap();
        assert_eq!(draft.description, "Pay rent");
        assert_eq!(draft.due_on.to_rfc3339(), "2024-01-01T12:00:00+00:00");
    }

    #[test]
    fn draft_trims_and_rejects_empty_description() {
        let err = TaskDraft::from_input("   ", "2024-01-01 - 09:00:00", "UTC").unwrap_err();
        assert!(matches!(err, Error::Validation { field: "description", .. }));

        let draft = TaskDraft::from_input("  Call mom ", "2024-01-01 - 09:00:00", "UTC").unwrap();
        assert_eq!(draft.description, "Call mom");
    }

    #[test]
    fn draft_rejects_long_description() {
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert!(TaskDraft::from_input(&long, "2024-01-01 - 09:00:00", "UTC").is_err());

        let max = "x".repeat(MAX_DESCRIPTION_LEN);
        assert!(TaskDraft::from_input(&max, "2024-01-01 - 09:00:00", "UTC").is_ok());
    }

    #[test]
    fn draft_rejects_malformed_date_and_zone() {
        assert!(matches!(
            TaskDraft::from_input("x", "tomorrow", "UTC").unwrap_err(),
            Error::Validation { field: "due_on", .. }
        ));
        assert!(matches!(
            TaskDraft::from_input("x", "2024-01-01 - 09:00:00", "Not/AZone").unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn new_task_defaults() {
        let draft = TaskDraft::from_input("Buy milk", "2024-01-01 - 09:00:00", "UTC").unwrap();
        let task = Task::new("alice", draft);
        assert!(!task.finished);
        assert_eq!(task.owner, "alice");
        assert!(task.is_owned_by("alice"));
        assert!(!task.is_owned_by("bob"));
    }

    #[test]
    fn due_is_inclusive() {
        let draft = TaskDraft::from_input("x", "2024-01-01 - 09:00:00", "UTC").unwrap();
        let mut task = Task::new("alice", draft);
        let due = task.due_on;
        assert!(task.is_due(due));
        assert!(!task.is_due(due - chrono::Duration::seconds(1)));
        task.finished = true;
        assert!(!task.is_due(due));
    }

    #[test]
    fn view_renders_local_time() {
        let draft =
            TaskDraft::from_input("Pay rent", "2024-01-01 - 09:00:00", "America/Sao_Paulo").unwrap();
        let task = Task::new("alice", draft);
        let view = TaskView::render(&task, "America/Sao_Paulo").unwrap();
        assert_eq!(view.due_on_local, "2024-01-01 - 09:00:00 - -03");
    }
}
