//! In-memory `HistoryStore`: volatile twin of the libSQL backend.
//!
//! Same call surface and semantics, nothing survives the process. Used by
//! tests and by `BOUNCER_DB_PATH=:memory:` runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::llm::ChatMessage;
use crate::store::traits::{HistoryStore, concat_batches};

#[derive(Default)]
struct Tables {
    messages: HashMap<String, Vec<Vec<u8>>>,
    blacklist: HashMap<String, bool>,
}

/// Volatile history store.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::Acquire) {
            Err(DatabaseError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn close(&self) -> Result<(), DatabaseError> {
        self.closed.store(true, Ordering::Release);
        let mut tables = self.tables.write().await;
        tables.messages.clear();
        tables.blacklist.clear();
        Ok(())
    }

    async fn append_batch(&self, user_id: &str, batch: &[u8]) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.tables
            .write()
            .await
            .messages
            .entry(user_id.to_string())
            .or_default()
            .push(batch.to_vec());
        Ok(())
    }

    async fn read_history(&self, user_id: &str) -> Result<Vec<ChatMessage>, DatabaseError> {
        self.ensure_open()?;
        let tables = self.tables.read().await;
        match tables.messages.get(user_id) {
            Some(blobs) => concat_batches(user_id, blobs.iter().map(Vec::as_slice)),
            None => Ok(Vec::new()),
        }
    }

    async fn clear_history(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.tables.write().await.messages.remove(user_id);
        Ok(())
    }

    async fn batch_count(&self, user_id: &str) -> Result<usize, DatabaseError> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .await
            .messages
            .get(user_id)
            .map_or(0, Vec::len))
    }

    async fn is_blacklisted(&self, user_id: &str) -> Result<bool, DatabaseError> {
        self.ensure_open()?;
        Ok(self
            .tables
            .read()
            .await
            .blacklist
            .get(user_id)
            .copied()
            .unwrap_or(false))
    }

    async fn set_blacklisted(&self, user_id: &str, value: bool) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.tables
            .write()
            .await
            .blacklist
            .insert(user_id.to_string(), value);
        Ok(())
    }
}
