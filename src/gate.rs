//! Message gate: turns one inbound direct message into at most one judged
//! exchange.
//!
//! Flow:
//! 1. Ignore anything that isn't a human's direct message
//! 2. Take the sender's lock; the remaining steps run under it
//! 3. Resolve guild membership and the queue / admitted voice channels
//! 4. Blacklisted users get the fixed rejection, no judgment
//! 5. User must be standing in the queue channel
//! 6. Load history, judge (with timeout), append the new batch
//! 7. Dispatch the verdict, carry out a requested move, reply
//!
//! The pipeline returns `Result<ExchangeOutcome, GateError>`; `handle()`
//! matches on it to produce the reply text.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::channels::{GuildPlatform, InboundMessage};
use crate::config::GuildConfig;
use crate::dispatch::{Action, Dispatcher};
use crate::error::{GateError, JudgeError};
use crate::judge::{Decision, Judge, JudgmentRequest};
use crate::store::HistoryStore;

/// Result of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub decision: Decision,
    pub action: Action,
    pub reply: String,
}

/// Entry point for inbound direct messages.
pub struct MessageGate {
    store: Arc<dyn HistoryStore>,
    judge: Arc<dyn Judge>,
    dispatcher: Dispatcher,
    guild: GuildConfig,
    judge_timeout: Duration,
    /// One lock per user so a user's exchanges run in arrival order.
    user_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl MessageGate {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        judge: Arc<dyn Judge>,
        guild: GuildConfig,
        judge_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&store)),
            store,
            judge,
            guild,
            judge_timeout,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one inbound message and send the reply.
    ///
    /// Returns the reply that was sent, or `None` when the message was
    /// ignored.
    pub async fn handle(
        &self,
        platform: &dyn GuildPlatform,
        message: &InboundMessage,
    ) -> Option<String> {
        if !message.is_direct || message.author_is_bot {
            return None;
        }

        let reply = match self.run_exchange(platform, message).await {
            Ok(outcome) => outcome.reply,
            Err(e) if e.is_guidance() => {
                debug!(user_id = message.author_id, reason = %e, "Exchange declined");
                e.user_message()
            }
            Err(e) => {
                warn!(user_id = message.author_id, error = %e, "Exchange failed");
                e.user_message()
            }
        };

        if let Err(e) = platform.send_text(message.channel_id, &reply).await {
            error!(
                user_id = message.author_id,
                channel_id = message.channel_id,
                error = %e,
                "Failed to deliver reply"
            );
        }
        Some(reply)
    }

    /// Run the exchange pipeline without sending anything to the user.
    ///
    /// Everything, including the member lookup, runs under the sender's
    /// lock, so a queued message sees where the member is now.
    pub async fn run_exchange(
        &self,
        platform: &dyn GuildPlatform,
        message: &InboundMessage,
    ) -> Result<ExchangeOutcome, GateError> {
        let user_id = message.author_id;

        let lock = self.user_lock(user_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.locked_exchange(platform, message).await
        };
        drop(lock);
        self.release_user_lock(user_id).await;

        outcome
    }

    /// Steps that must not interleave for the same user.
    async fn locked_exchange(
        &self,
        platform: &dyn GuildPlatform,
        message: &InboundMessage,
    ) -> Result<ExchangeOutcome, GateError> {
        let user_id = message.author_id;
        let key = user_id.to_string();

        if !platform.guild_available().await {
            return Err(GateError::GuildNotFound);
        }

        let member = platform
            .member(user_id)
            .await?
            .ok_or(GateError::UserNotFound(user_id))?;

        let queue_name = platform
            .voice_channel_name(self.guild.queue_channel_id)
            .await
            .ok_or(GateError::ChannelNotFound {
                label: "Queue",
                channel_id: self.guild.queue_channel_id,
            })?;
        if platform
            .voice_channel_name(self.guild.admitted_channel_id)
            .await
            .is_none()
        {
            return Err(GateError::ChannelNotFound {
                label: "Bar",
                channel_id: self.guild.admitted_channel_id,
            });
        }

        if self.store.is_blacklisted(&key).await? {
            return Err(GateError::Blacklisted(user_id));
        }

        if member.voice_channel_id != Some(self.guild.queue_channel_id) {
            return Err(GateError::WrongLocation {
                user_id,
                queue_name,
            });
        }

        let history = self.store.read_history(&key).await?;
        let request = JudgmentRequest {
            content: message.content.clone(),
            image_url: member.avatar_url.clone(),
            history,
            display_name: member.display_name.clone(),
        };

        let judgment = tokio::time::timeout(self.judge_timeout, self.judge.judge(request))
            .await
            .map_err(|_| JudgeError::Timeout(self.judge_timeout))??;

        // Stands even if the move below fails: it records what was said.
        self.store.append_turns(&key, &judgment.batch).await?;

        let action = self.dispatcher.dispatch(&key, &judgment.verdict).await?;
        if action == Action::MoveToAdmitted {
            platform
                .move_member(user_id, self.guild.admitted_channel_id)
                .await?;
            info!(user_id, "Member admitted");
        }

        Ok(ExchangeOutcome {
            decision: judgment.verdict.decision,
            action,
            reply: judgment.verdict.reply,
        })
    }

    async fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        Arc::clone(locks.entry(user_id).or_default())
    }

    /// Drop the user's lock entry once nobody else is waiting on it.
    async fn release_user_lock(&self, user_id: u64) {
        let mut locks = self.user_locks.lock().await;
        if locks
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&user_id);
        }
    }
}
