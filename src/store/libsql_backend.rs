//! libSQL backend: durable `HistoryStore` implementation.
//!
//! One connection is shared by every in-flight exchange. `libsql::Connection`
//! is `Send + Sync` and safe for concurrent async use; the surrounding
//! `RwLock` only exists so `close()` can take it away.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::llm::ChatMessage;
use crate::store::migrations;
use crate::store::traits::{HistoryStore, concat_batches};

struct Handle {
    // Keeps the database alive for as long as the connection is.
    _db: LibSqlDatabase,
    conn: Connection,
}

/// libSQL-backed history store.
pub struct LibSqlHistoryStore {
    handle: RwLock<Option<Handle>>,
}

impl LibSqlHistoryStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Unavailable(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::init(db).await?;
        info!(path = %path.display(), "History store opened");
        Ok(store)
    }

    /// Create an in-memory libSQL database (for tests).
    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::init(db).await
    }

    async fn init(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Unavailable(format!("Failed to create connection: {e}")))?;

        migrations::apply_pragmas(&conn).await?;
        migrations::run_migrations(&conn).await.map_err(|e| {
            DatabaseError::Unavailable(format!("Failed to initialize schema: {e}"))
        })?;

        Ok(Self {
            handle: RwLock::new(Some(Handle { _db: db, conn })),
        })
    }

    /// Clone out the open connection, or fail if the store was closed.
    async fn conn(&self) -> Result<Connection, DatabaseError> {
        self.handle
            .read()
            .await
            .as_ref()
            .map(|h| h.conn.clone())
            .ok_or(DatabaseError::Closed)
    }
}

#[async_trait]
impl HistoryStore for LibSqlHistoryStore {
    async fn close(&self) -> Result<(), DatabaseError> {
        let mut guard = self.handle.write().await;
        if guard.take().is_some() {
            info!("History store closed");
        }
        Ok(())
    }

    // ── History ─────────────────────────────────────────────────────

    async fn append_batch(&self, user_id: &str, batch: &[u8]) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO messages (user_id, message_list) VALUES (?1, ?2)",
            params![user_id, libsql::Value::Blob(batch.to_vec())],
        )
        .await
        .map_err(|e| DatabaseError::Write(format!("append_batch: {e}")))?;

        debug!(user_id, bytes = batch.len(), "Appended history batch");
        Ok(())
    }

    async fn read_history(&self, user_id: &str) -> Result<Vec<ChatMessage>, DatabaseError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT message_list FROM messages WHERE user_id = ?1 ORDER BY id",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("read_history: {e}")))?;

        let mut blobs: Vec<Vec<u8>> = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("read_history: {e}")))?
        {
            let blob: Vec<u8> = row.get(0).map_err(|e| DatabaseError::HistoryCorrupt {
                user_id: user_id.to_string(),
                reason: format!("unreadable batch column: {e}"),
            })?;
            blobs.push(blob);
        }

        concat_batches(user_id, blobs.iter().map(Vec::as_slice))
    }

    async fn clear_history(&self, user_id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute("DELETE FROM messages WHERE user_id = ?1", params![user_id])
            .await
            .map_err(|e| DatabaseError::Write(format!("clear_history: {e}")))?;

        debug!(user_id, deleted, "Cleared history");
        Ok(())
    }

    async fn batch_count(&self, user_id: &str) -> Result<usize, DatabaseError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM messages WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("batch_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("batch_count: {e}")))?;
                Ok(usize::try_from(count).unwrap_or(0))
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("batch_count: {e}"))),
        }
    }

    // ── Blacklist ───────────────────────────────────────────────────

    async fn is_blacklisted(&self, user_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn().await?;
        let mut rows = conn
            .query(
                "SELECT is_blacklisted FROM blacklist WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_blacklisted: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let flag: i64 = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("is_blacklisted: {e}")))?;
                Ok(flag != 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("is_blacklisted: {e}"))),
        }
    }

    async fn set_blacklisted(&self, user_id: &str, value: bool) -> Result<(), DatabaseError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO blacklist (user_id, is_blacklisted)
             VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET is_blacklisted = excluded.is_blacklisted",
            params![user_id, i64::from(value)],
        )
        .await
        .map_err(|e| DatabaseError::Write(format!("set_blacklisted: {e}")))?;

        info!(user_id, blacklisted = value, "Blacklist updated");
        Ok(())
    }
}
