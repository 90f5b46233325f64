//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::StorageError;

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
            CREATE TABLE IF NOT EXISTS flow_tokens (
                token TEXT PRIMARY KEY,
                phone TEXT NOT NULL,
                flow_type TEXT NOT NULL,
                context TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_flow_tokens_phone ON flow_tokens(phone);
            CREATE INDEX IF NOT EXISTS idx_flow_tokens_expires ON flow_tokens(expires_at);

            CREATE TABLE IF NOT EXISTS trainers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                specializations TEXT NOT NULL DEFAULT '',
                services TEXT NOT NULL DEFAULT '',
                price_per_session TEXT NOT NULL,
                pricing_flexibility TEXT NOT NULL DEFAULT '',
                availability TEXT NOT NULL DEFAULT '',
                terms_accepted INTEGER NOT NULL DEFAULT 0,
                marketing_consent INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending_approval',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trainers_status ON trainers(status);

            CREATE TABLE IF NOT EXISTS clients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                fitness_goals TEXT NOT NULL DEFAULT '',
                session_types TEXT NOT NULL DEFAULT '',
                budget_per_session TEXT,
                availability TEXT NOT NULL DEFAULT '',
                terms_accepted INTEGER NOT NULL DEFAULT 0,
                marketing_consent INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending_approval',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_clients_status ON clients(status);
        "#,
    },
    Migration {
        version: 2,
        name: "habit_tracking",
        sql: r#"
            CREATE TABLE IF NOT EXISTS habits (
                id TEXT PRIMARY KEY,
                owner_phone TEXT NOT NULL,
                title TEXT NOT NULL,
                cadence TEXT NOT NULL DEFAULT 'daily',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_habits_owner ON habits(owner_phone);

            CREATE TABLE IF NOT EXISTS habit_logs (
                id TEXT PRIMARY KEY,
                habit_id TEXT NOT NULL,
                logged_on TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 1,
                note TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_habit_logs_habit ON habit_logs(habit_id);
        "#,
    },
    Migration {
        version: 3,
        name: "text_registrations",
        sql: r#"
            CREATE TABLE IF NOT EXISTS text_registrations (
                phone TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                phase TEXT NOT NULL,
                answers TEXT NOT NULL DEFAULT '{}',
                message_count INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StorageError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                StorageError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, StorageError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StorageError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| StorageError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                StorageError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| StorageError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    #[tokio::test]
    async fn migrations_apply_cleanly_and_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        // A second run must be a no-op.
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().version);
    }

    #[tokio::test]
    async fn all_tables_exist_after_migration() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in [
            "flow_tokens",
            "trainers",
            "clients",
            "habits",
            "habit_logs",
            "text_registrations",
        ] {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    libsql::params![table],
                )
                .await
                .unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let count: i64 = row.get(0).unwrap();
            assert_eq!(count, 1, "table {table} missing");
        }
    }
}
