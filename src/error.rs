//! Error types for the bouncer.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// History store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Store handle is closed")]
    Closed,

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("History for user {user_id} is corrupt: {reason}")]
    HistoryCorrupt { user_id: String, reason: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messaging platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message to channel {channel_id}: {reason}")]
    SendFailed { channel_id: u64, reason: String },

    #[error("Failed to move member {user_id} to channel {channel_id}: {reason}")]
    MoveFailed {
        user_id: u64,
        channel_id: u64,
        reason: String,
    },

    #[error("Member lookup failed for {user_id}: {reason}")]
    MemberLookup { user_id: u64, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Judgment service errors.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Malformed verdict: {0}")]
    MalformedVerdict(String),

    #[error("Judgment timed out after {0:?}")]
    Timeout(Duration),
}

/// Reasons an exchange at the message gate could not complete.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Server not found")]
    GuildNotFound,

    #[error("User {0} is not a member of the server")]
    UserNotFound(u64),

    #[error("{label} voice channel {channel_id} not found")]
    ChannelNotFound {
        label: &'static str,
        channel_id: u64,
    },

    #[error("User {0} is blacklisted")]
    Blacklisted(u64),

    #[error("User {user_id} is not in the queue channel")]
    WrongLocation { user_id: u64, queue_name: String },

    #[error("Judgment failed: {0}")]
    Judgment(#[from] JudgeError),

    #[error("Storage failed: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Platform call failed: {0}")]
    Platform(#[from] ChannelError),
}

/// Text shown to a blacklisted user.
pub const BLACKLISTED_REPLY: &str =
    "Sorry you ain't getting in today mate, go home and get some sleep";

impl GateError {
    /// Whether this is user guidance rather than a failure worth logging.
    pub fn is_guidance(&self) -> bool {
        matches!(
            self,
            GateError::GuildNotFound
                | GateError::UserNotFound(_)
                | GateError::ChannelNotFound { .. }
                | GateError::Blacklisted(_)
                | GateError::WrongLocation { .. }
        )
    }

    /// Reply text delivered to the user in their DM channel.
    pub fn user_message(&self) -> String {
        match self {
            GateError::GuildNotFound => "Server not found.".to_string(),
            GateError::UserNotFound(_) => "Could not find you in the server.".to_string(),
            GateError::ChannelNotFound { label, .. } => {
                format!("{label} voice channel not found.")
            }
            GateError::Blacklisted(_) => BLACKLISTED_REPLY.to_string(),
            GateError::WrongLocation { queue_name, .. } => {
                format!("Please join the queue voice channel first: {queue_name}")
            }
            GateError::Judgment(e) => format!("Could not move you to the voice channel: {e}"),
            GateError::Storage(e) => format!("Could not move you to the voice channel: {e}"),
            GateError::Platform(e) => format!("Could not move you to the voice channel: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guidance_errors_are_not_failures() {
        assert!(GateError::UserNotFound(1).is_guidance());
        assert!(GateError::Blacklisted(1).is_guidance());
        assert!(!GateError::Storage(DatabaseError::Closed).is_guidance());
        assert!(!GateError::Judgment(JudgeError::Timeout(Duration::from_secs(1))).is_guidance());
    }

    #[test]
    fn blacklisted_reply_is_the_fixed_text() {
        assert_eq!(
            GateError::Blacklisted(1).user_message(),
            "Sorry you ain't getting in today mate, go home and get some sleep"
        );
    }

    #[test]
    fn wrong_location_names_the_queue() {
        let err = GateError::WrongLocation {
            user_id: 7,
            queue_name: "Queue".into(),
        };
        assert_eq!(
            err.user_message(),
            "Please join the queue voice channel first: Queue"
        );
    }

    #[test]
    fn channel_not_found_uses_label() {
        let err = GateError::ChannelNotFound {
            label: "Bar",
            channel_id: 42,
        };
        assert_eq!(err.user_message(), "Bar voice channel not found.");
    }

    #[test]
    fn failures_use_generic_prefix() {
        let err = GateError::Storage(DatabaseError::Write("disk full".into()));
        assert!(
            err.user_message()
                .starts_with("Could not move you to the voice channel:")
        );
    }
}
