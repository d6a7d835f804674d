//! Decision dispatcher: maps a verdict onto store mutations and the
//! external action the gate should carry out.
//!
//! No platform calls happen here; the returned `Action` is executed by the
//! gate.

use std::sync::Arc;

use tracing::info;

use crate::error::DatabaseError;
use crate::judge::{Decision, Verdict};
use crate::store::HistoryStore;

/// External action requested by a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Move the user into the admitted voice channel, then reply.
    MoveToAdmitted,
    /// Only send the reply text.
    ReplyOnly,
}

/// Stateless between calls; owns nothing but a store handle.
pub struct Dispatcher {
    store: Arc<dyn HistoryStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Apply the verdict's store effect and return the action to perform.
    ///
    /// - Admit: no mutation, move requested
    /// - Reject: user blacklisted, reply only
    /// - Defer: no mutation, reply only
    pub async fn dispatch(&self, user_id: &str, verdict: &Verdict) -> Result<Action, DatabaseError> {
        let action = match verdict.decision {
            Decision::Admit => Action::MoveToAdmitted,
            Decision::Reject => {
                self.store.set_blacklisted(user_id, true).await?;
                Action::ReplyOnly
            }
            Decision::Defer => Action::ReplyOnly,
        };

        info!(
            user_id,
            decision = verdict.decision.label(),
            rationale = %verdict.rationale,
            action = ?action,
            "Verdict dispatched"
        );
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryHistoryStore;

    fn setup() -> (Arc<InMemoryHistoryStore>, Dispatcher) {
        let store = Arc::new(InMemoryHistoryStore::new());
        let dispatcher = Dispatcher::new(store.clone());
        (store, dispatcher)
    }

    #[tokio::test]
    async fn admit_requests_move_and_leaves_blacklist() {
        let (store, dispatcher) = setup();
        let action = dispatcher
            .dispatch("alice", &Verdict::new(Decision::Admit, "Come in"))
            .await
            .unwrap();
        assert_eq!(action, Action::MoveToAdmitted);
        assert!(!store.is_blacklisted("alice").await.unwrap());
    }

    #[tokio::test]
    async fn admit_does_not_clear_existing_flag() {
        let (store, dispatcher) = setup();
        store.set_blacklisted("alice", true).await.unwrap();
        dispatcher
            .dispatch("alice", &Verdict::new(Decision::Admit, "Come in"))
            .await
            .unwrap();
        assert!(store.is_blacklisted("alice").await.unwrap());
    }

    #[tokio::test]
    async fn reject_blacklists() {
        let (store, dispatcher) = setup();
        let action = dispatcher
            .dispatch("bob", &Verdict::new(Decision::Reject, "Go home"))
            .await
            .unwrap();
        assert_eq!(action, Action::ReplyOnly);
        assert!(store.is_blacklisted("bob").await.unwrap());
    }

    #[tokio::test]
    async fn defer_mutates_nothing() {
        let (store, dispatcher) = setup();
        let action = dispatcher
            .dispatch("dave", &Verdict::new(Decision::Defer, "Tell me more"))
            .await
            .unwrap();
        assert_eq!(action, Action::ReplyOnly);
        assert!(!store.is_blacklisted("dave").await.unwrap());
        assert_eq!(store.batch_count("dave").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reject_on_closed_store_fails() {
        let (store, dispatcher) = setup();
        store.close().await.unwrap();
        let result = dispatcher
            .dispatch("bob", &Verdict::new(Decision::Reject, "Go home"))
            .await;
        assert!(matches!(result, Err(DatabaseError::Closed)));
    }
}
