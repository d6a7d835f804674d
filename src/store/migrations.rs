//! Version-tracked schema migrations for the libSQL history store.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially, so
//! opening an existing database is idempotent.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "history_and_blacklist",
    sql: r#"
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            message_list BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_userid_id
            ON messages (user_id, id);

        CREATE TABLE IF NOT EXISTS blacklist (
            user_id TEXT PRIMARY KEY,
            is_blacklisted INTEGER NOT NULL CHECK (is_blacklisted IN (0,1))
        );
    "#,
}];

/// Apply connection pragmas for the configured durability level.
///
/// `synchronous=NORMAL`: a committed write survives a process crash.
pub async fn apply_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    // journal_mode returns a row, so it goes through query().
    let mut rows = conn
        .query("PRAGMA journal_mode=WAL", ())
        .await
        .map_err(|e| DatabaseError::Unavailable(format!("Failed to set journal_mode: {e}")))?;
    while rows
        .next()
        .await
        .map_err(|e| DatabaseError::Unavailable(format!("Failed to read journal_mode: {e}")))?
        .is_some()
    {}

    conn.execute("PRAGMA synchronous=NORMAL", ())
        .await
        .map_err(|e| DatabaseError::Unavailable(format!("Failed to set synchronous: {e}")))?;
    Ok(())
}

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::debug!(
        version = get_current_version(conn).await?,
        "Database migrations complete"
    );
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
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

    async fn table_exists(conn: &Connection, table: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                libsql::params![table],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        row.get::<i64>(0).unwrap() == 1
    }

    #[tokio::test]
    async fn migrations_create_both_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in ["messages", "blacklist", "_migrations"] {
            assert!(table_exists(&conn, table).await, "Table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn blacklist_rejects_non_boolean_flag() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let result = conn
            .execute(
                "INSERT INTO blacklist (user_id, is_blacklisted) VALUES ('u', 2)",
                (),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn pragmas_apply_to_memory_db() {
        let conn = test_conn().await;
        apply_pragmas(&conn).await.unwrap();
    }

    #[tokio::test]
    async fn pragmas_switch_file_db_to_wal() {
        let tmp = tempfile::tempdir().unwrap();
        let db = libsql::Builder::new_local(tmp.path().join("wal.sqlite3"))
            .build()
            .await
            .unwrap();
        let conn = db.connect().unwrap();
        apply_pragmas(&conn).await.unwrap();

        let mut rows = conn.query("PRAGMA journal_mode", ()).await.unwrap();
        let mode: String = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(mode.to_ascii_lowercase(), "wal");
    }
}
