//! `HistoryStore` trait: single async interface for conversation history
//! and blacklist persistence.
//!
//! Two backends implement it: `LibSqlHistoryStore` (durable) and
//! `InMemoryHistoryStore` (volatile). The gate and dispatcher only ever see
//! `Arc<dyn HistoryStore>`.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::llm::ChatMessage;

/// Encode one exchange's turns as an immutable batch blob.
pub fn encode_batch(turns: &[ChatMessage]) -> Result<Vec<u8>, DatabaseError> {
    serde_json::to_vec(turns).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Decode a stored batch blob back into turns.
pub fn decode_batch(blob: &[u8]) -> Result<Vec<ChatMessage>, serde_json::Error> {
    serde_json::from_slice(blob)
}

/// Decode and concatenate a user's batches in the order given.
pub(crate) fn concat_batches<'a, I>(user_id: &str, blobs: I) -> Result<Vec<ChatMessage>, DatabaseError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut turns = Vec::new();
    for (index, blob) in blobs.into_iter().enumerate() {
        let batch = decode_batch(blob).map_err(|e| DatabaseError::HistoryCorrupt {
            user_id: user_id.to_string(),
            reason: format!("batch {index}: {e}"),
        })?;
        turns.extend(batch);
    }
    Ok(turns)
}

/// Backend-agnostic history and blacklist store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Release underlying resources. Every later call fails with `Closed`.
    async fn close(&self) -> Result<(), DatabaseError>;

    // ── History ─────────────────────────────────────────────────────

    /// Append one immutable batch to the user's ordered log.
    async fn append_batch(&self, user_id: &str, batch: &[u8]) -> Result<(), DatabaseError>;

    /// All turns for the user, batches concatenated in insertion order.
    async fn read_history(&self, user_id: &str) -> Result<Vec<ChatMessage>, DatabaseError>;

    /// Delete every batch for the user. No error if there were none.
    async fn clear_history(&self, user_id: &str) -> Result<(), DatabaseError>;

    /// Number of stored batches for the user.
    async fn batch_count(&self, user_id: &str) -> Result<usize, DatabaseError>;

    /// Encode `turns` as one batch and append it.
    async fn append_turns(&self, user_id: &str, turns: &[ChatMessage]) -> Result<(), DatabaseError> {
        let blob = encode_batch(turns)?;
        self.append_batch(user_id, &blob).await
    }

    // ── Blacklist ───────────────────────────────────────────────────

    /// False when the user has no entry.
    async fn is_blacklisted(&self, user_id: &str) -> Result<bool, DatabaseError>;

    /// Upsert the user's flag.
    async fn set_blacklisted(&self, user_id: &str, value: bool) -> Result<(), DatabaseError>;

    async fn add_to_blacklist(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.set_blacklisted(user_id, true).await
    }

    async fn remove_from_blacklist(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.set_blacklisted(user_id, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_batch_names_user_and_index() {
        let good = encode_batch(&[ChatMessage::user("hi")]).unwrap();
        let bad = b"not json".to_vec();
        let err = concat_batches("u1", [good.as_slice(), bad.as_slice()]).unwrap_err();
        match err {
            DatabaseError::HistoryCorrupt { user_id, reason } => {
                assert_eq!(user_id, "u1");
                assert!(reason.starts_with("batch 1"));
            }
            other => panic!("expected HistoryCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn batches_concatenate_in_order() {
        let b1 = encode_batch(&[ChatMessage::user("one"), ChatMessage::assistant("two")]).unwrap();
        let b2 = encode_batch(&[ChatMessage::user("three")]).unwrap();
        let turns = concat_batches("u", [b1.as_slice(), b2.as_slice()]).unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);
    }
}
