//! libSQL implementation of the `Database` trait.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 UTC strings with fixed nanosecond precision so that text
//! comparison in SQL orders them chronologically.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::settings::model::UserSettings;
use crate::store::migrations;
use crate::store::traits::Database;
use crate::tasks::model::Task;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn query_tasks(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op} row: {e}")))?
        {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn query_settings(
        &self,
        op: &str,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<UserSettings>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut found = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op} row: {e}")))?
        {
            found.push(row_to_settings(&row)?);
        }
        Ok(found)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format for timestamps.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(field: &str, s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("{field} parse: {e}")))
}

fn flag(b: bool) -> i64 {
    b as i64
}

const TASK_COLUMNS: &str = "id, owner, description, due_on, created_on, finished";

/// Column order matches TASK_COLUMNS.
fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    let get = |idx: i32, field: &str| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("task.{field}: {e}")))
    };

    let id_str = get(0, "id")?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Query(format!("task.id parse: {e}")))?;

    Ok(Task {
        id,
        owner: get(1, "owner")?,
        description: get(2, "description")?,
        due_on: parse_ts("task.due_on", &get(3, "due_on")?)?,
        created_on: parse_ts("task.created_on", &get(4, "created_on")?)?,
        finished: row.get::<i64>(5).unwrap_or(0) != 0,
    })
}

const SETTINGS_COLUMNS: &str =
    "owner, email, api_key, verified, chat_address, timezone, chat_enabled, email_enabled";

/// Column order matches SETTINGS_COLUMNS.
fn row_to_settings(row: &libsql::Row) -> Result<UserSettings, DatabaseError> {
    let get = |idx: i32, field: &str| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("settings.{field}: {e}")))
    };

    Ok(UserSettings {
        owner: get(0, "owner")?,
        email: get(1, "email")?,
        api_key: get(2, "api_key")?,
        verified: row.get::<i64>(3).unwrap_or(0) != 0,
        chat_address: get(4, "chat_address")?,
        timezone: get(5, "timezone")?,
        chat_enabled: row.get::<i64>(6).unwrap_or(1) != 0,
        email_enabled: row.get::<i64>(7).unwrap_or(1) != 0,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::init_schema(self.conn()).await
    }

    // ── Tasks ───────────────────────────────────────────────────────

    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    task.id.to_string(),
                    task.owner.as_str(),
                    task.description.as_str(),
                    ts(task.due_on),
                    ts(task.created_on),
                    flag(task.finished),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_task: {e}")))?;

        debug!(task_id = %task.id, owner = %task.owner, "Task inserted");
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, DatabaseError> {
        let tasks = self
            .query_tasks(
                "get_task",
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        Ok(tasks.into_iter().next())
    }

    async fn update_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE tasks SET description = ?1, due_on = ?2 WHERE id = ?3",
                params![task.description.as_str(), ts(task.due_on), task.id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_task: {e}")))?;

        debug!(task_id = %task.id, "Task updated");
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_task: {e}")))?;
        Ok(count > 0)
    }

    async fn mark_task_finished(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE tasks SET finished = 1 WHERE id = ?1 AND finished = 0",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_task_finished: {e}")))?;
        Ok(count > 0)
    }

    async fn list_tasks_by_owner(
        &self,
        owner: &str,
        include_finished: bool,
    ) -> Result<Vec<Task>, DatabaseError> {
        let sql = if include_finished {
            format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner = ?1 ORDER BY due_on ASC, id ASC")
        } else {
            format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE owner = ?1 AND finished = 0 ORDER BY due_on ASC, id ASC"
            )
        };
        self.query_tasks("list_tasks_by_owner", &sql, params![owner])
            .await
    }

    async fn list_tasks_in_range(
        &self,
        owner: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(
            "list_tasks_in_range",
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks \
                 WHERE owner = ?1 AND finished = 0 AND due_on >= ?2 AND due_on <= ?3 \
                 ORDER BY due_on ASC, id ASC LIMIT ?4"
            ),
            params![owner, ts(start), ts(end), limit as i64],
        )
        .await
    }

    async fn list_due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>, DatabaseError> {
        self.query_tasks(
            "list_due_tasks",
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE finished = 0 AND due_on <= ?1 \
                 ORDER BY due_on ASC, id ASC"
            ),
            params![ts(now)],
        )
        .await
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_settings(&self, owner: &str) -> Result<Option<UserSettings>, DatabaseError> {
        let found = self
            .query_settings(
                "get_settings",
                &format!("SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE owner = ?1"),
                params![owner],
            )
            .await?;
        Ok(found.into_iter().next())
    }

    async fn list_settings_by_chat_address(
        &self,
        address: &str,
    ) -> Result<Vec<UserSettings>, DatabaseError> {
        self.query_settings(
            "list_settings_by_chat_address",
            &format!(
                "SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE chat_address = ?1 \
                 ORDER BY verified DESC, owner ASC"
            ),
            params![address.to_lowercase()],
        )
        .await
    }

    async fn insert_settings(&self, settings: &UserSettings) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO user_settings ({SETTINGS_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    settings.owner.as_str(),
                    settings.email.as_str(),
                    settings.api_key.as_str(),
                    flag(settings.verified),
                    settings.chat_address.as_str(),
                    settings.timezone.as_str(),
                    flag(settings.chat_enabled),
                    flag(settings.email_enabled),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("insert_settings: {msg}"))
                } else {
                    DatabaseError::Query(format!("insert_settings: {msg}"))
                }
            })?;

        debug!(owner = %settings.owner, "Settings created");
        Ok(())
    }

    async fn update_settings(&self, settings: &UserSettings) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE user_settings SET email = ?1, verified = ?2, chat_address = ?3, \
                 timezone = ?4, chat_enabled = ?5, email_enabled = ?6 WHERE owner = ?7",
                params![
                    settings.email.as_str(),
                    flag(settings.verified),
                    settings.chat_address.as_str(),
                    settings.timezone.as_str(),
                    flag(settings.chat_enabled),
                    flag(settings.email_enabled),
                    settings.owner.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_settings: {e}")))?;

        debug!(owner = %settings.owner, "Settings updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use crate::tasks::model::TaskDraft;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn make_task(owner: &str, due: &str) -> Task {
        let mut task = Task::new(
            owner,
            TaskDraft::from_input("Water plants", "2024-01-01 - 00:00:00", "UTC").unwrap(),
        );
        task.due_on = utc(due);
        task
    }

    // ── Task tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn insert_and_get_task() {
        let db = test_db().await;
        let task = make_task("alice", "2024-01-01T12:00:00Z");
        db.insert_task(&task).await.unwrap();

        let fetched = db.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched, task);
    }

    #[tokio::test]
    async fn get_task_not_found() {
        let db = test_db().await;
        assert!(db.get_task(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_does_not_touch_finished() {
        let db = test_db().await;
        let mut task = make_task("alice", "2024-01-01T12:00:00Z");
        db.insert_task(&task).await.unwrap();
        db.mark_task_finished(task.id).await.unwrap();

        task.description = "Water cactus".into();
        task.finished = false;
        db.update_task(&task).await.unwrap();

        let fetched = db.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.description, "Water cactus");
        assert!(fetched.finished);
    }

    #[tokio::test]
    async fn mark_finished_only_once() {
        let db = test_db().await;
        let task = make_task("alice", "2024-01-01T12:00:00Z");
        db.insert_task(&task).await.unwrap();

        assert!(db.mark_task_finished(task.id).await.unwrap());
        assert!(!db.mark_task_finished(task.id).await.unwrap());
        assert!(!db.mark_task_finished(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn delete_task_reports_removal() {
        let db = test_db().await;
        let task = make_task("alice", "2024-01-01T12:00:00Z");
        db.insert_task(&task).await.unwrap();

        assert!(db.delete_task(task.id).await.unwrap());
        assert!(!db.delete_task(task.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_by_owner_filters_finished() {
        let db = test_db().await;
        let open = make_task("alice", "2024-01-02T00:00:00Z");
        let done = make_task("alice", "2024-01-01T00:00:00Z");
        let other = make_task("bob", "2024-01-01T00:00:00Z");
        for t in [&open, &done, &other] {
            db.insert_task(t).await.unwrap();
        }
        db.mark_task_finished(done.id).await.unwrap();

        let unfinished = db.list_tasks_by_owner("alice", false).await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, open.id);

        let all = db.list_tasks_by_owner("alice", true).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, done.id, "ordered by due time");
    }

    #[tokio::test]
    async fn due_tasks_inclusive_and_cross_owner() {
        let db = test_db().await;
        let now = utc("2024-06-01T12:00:00Z");
        let exact = make_task("alice", "2024-06-01T12:00:00Z");
        let past = make_task("bob", "2024-05-01T08:00:00Z");
        let future = make_task("alice", "2024-06-01T12:00:01Z");
        for t in [&exact, &past, &future] {
            db.insert_task(t).await.unwrap();
        }

        let due = db.list_due_tasks(now).await.unwrap();
        let ids: Vec<Uuid> = due.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![past.id, exact.id]);
    }

    #[tokio::test]
    async fn sub_second_precision_orders_correctly() {
        let db = test_db().await;
        let mut task = make_task("alice", "2024-06-01T12:00:00Z");
        task.due_on = utc("2024-06-01T12:00:00.5Z");
        db.insert_task(&task).await.unwrap();

        assert!(db.list_due_tasks(utc("2024-06-01T12:00:00Z")).await.unwrap().is_empty());
        assert_eq!(db.list_due_tasks(utc("2024-06-01T12:00:01Z")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn range_query_respects_limit() {
        let db = test_db().await;
        for minute in 0..12 {
            let task = make_task("alice", &format!("2024-06-01T10:{minute:02}:00Z"));
            db.insert_task(&task).await.unwrap();
        }
        let tasks = db
            .list_tasks_in_range(
                "alice",
                utc("2024-06-01T00:00:00Z"),
                utc("2024-06-01T23:59:59Z"),
                10,
            )
            .await
            .unwrap();
        assert_eq!(tasks.len(), 10);
    }

    // ── Settings tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn settings_round_trip() {
        let db = test_db().await;
        let mut settings = UserSettings::for_identity(&Identity::new("alice", "alice@example.com"));
        db.insert_settings(&settings).await.unwrap();
        assert_eq!(db.get_settings("alice").await.unwrap().unwrap(), settings);

        settings.verified = true;
        settings.timezone = "Europe/Berlin".into();
        settings.email_enabled = false;
        db.update_settings(&settings).await.unwrap();
        assert_eq!(db.get_settings("alice").await.unwrap().unwrap(), settings);
    }

    #[tokio::test]
    async fn settings_owner_is_unique() {
        let db = test_db().await;
        let settings = UserSettings::for_identity(&Identity::new("alice", "alice@example.com"));
        db.insert_settings(&settings).await.unwrap();
        let err = db.insert_settings(&settings).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn settings_by_chat_address_puts_verified_first() {
        let db = test_db().await;
        let alice = UserSettings::for_identity(&Identity::new("alice", "Alice@Example.com"));
        db.insert_settings(&alice).await.unwrap();
        let mut squatter = UserSettings::for_identity(&Identity::new("mallory", "mallory@example.com"));
        squatter.chat_address = "alice@example.com".into();
        db.insert_settings(&squatter).await.unwrap();

        let found = db
            .list_settings_by_chat_address("ALICE@example.com")
            .await
            .unwrap();
        let owners: Vec<&str> = found.iter().map(|s| s.owner.as_str()).collect();
        assert_eq!(owners, vec!["alice", "mallory"]);

        let mut verified = squatter.clone();
        verified.verified = true;
        db.update_settings(&verified).await.unwrap();
        let found = db
            .list_settings_by_chat_address("alice@example.com")
            .await
            .unwrap();
        assert_eq!(found[0].owner, "mallory");

        assert!(
            db.list_settings_by_chat_address("bob@example.com")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("test.db");
        let db = LibSqlBackend::new_local(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(db);
    }
}
