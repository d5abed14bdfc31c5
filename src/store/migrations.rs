//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `init_schema()` checks the
//! current version and applies only the new ones sequentially.

use libsql::Connection;
use tracing::info;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                description TEXT NOT NULL,
                due_on TEXT NOT NULL,
                created_on TEXT NOT NULL,
                finished INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks(owner, finished, due_on);
            CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(finished, due_on);

            CREATE TABLE IF NOT EXISTS user_settings (
                owner TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                api_key TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                chat_address TEXT NOT NULL,
                timezone TEXT NOT NULL DEFAULT 'UTC'
            );
            CREATE INDEX IF NOT EXISTS idx_user_settings_chat ON user_settings(chat_address);
        "#,
    },
    Migration {
        version: 2,
        name: "delivery_preferences",
        sql: r#"
            ALTER TABLE user_settings ADD COLUMN chat_enabled INTEGER NOT NULL DEFAULT 1;
            ALTER TABLE user_settings ADD COLUMN email_enabled INTEGER NOT NULL DEFAULT 1;
        "#,
    },
];

/// Create the migrations table and apply every migration newer than the
/// recorded version.
pub async fn init_schema(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("create _migrations: {e}")))?;

    let current = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!("V{} {}: {e}", migration.version, migration.name))
            })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("record V{}: {e}", migration.version)))?;
        info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("read version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
        Ok(None) => Ok(0),
        Err(e) => Err(DatabaseError::Migration(format!("read version: {e}"))),
    }
}

/// Latest schema version known to this build.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn applies_all_migrations() {
        let conn = memory_conn().await;
        init_schema(&conn).await.unwrap();
        assert_eq!(current_version(&conn).await.unwrap(), latest_version());
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = memory_conn().await;
        init_schema(&conn).await.unwrap();
        init_schema(&conn).await.unwrap();
        assert_eq!(current_version(&conn).await.unwrap(), latest_version());
    }
}
