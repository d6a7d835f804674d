//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_AZURE_API_VERSION, LlmBackend};

/// Posted to the announce channel once the bot is connected.
pub const OPENING_ANNOUNCEMENT: &str =
    "The bar is now open! Enter the queue and message me to request entry.";

/// Path value that selects the volatile in-memory history store.
pub const IN_MEMORY_DB: &str = ":memory:";

/// Discord ids the gate works against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildConfig {
    pub guild_id: u64,
    pub announce_channel_id: u64,
    pub queue_channel_id: u64,
    /// The admitted area ("bar") voice channel.
    pub admitted_channel_id: u64,
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BouncerConfig {
    pub discord_token: SecretString,
    pub guild: GuildConfig,
    pub llm_backend: LlmBackend,
    pub llm_api_key: SecretString,
    pub model: String,
    /// Personality layered on the bouncer instructions, if any.
    pub persona: Option<String>,
    pub db_path: PathBuf,
    pub judge_timeout: Duration,
}

impl BouncerConfig {
    /// Build config from environment variables (after loading `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let id = |key: &str| -> Result<u64, ConfigError> {
            let raw = required(key)?;
            match raw.parse::<u64>() {
                Ok(0) | Err(_) => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected a non-zero Discord id, got '{raw}'"),
                }),
                Ok(v) => Ok(v),
            }
        };

        let discord_token = SecretString::from(required("DISCORD_API_KEY")?);

        let guild = GuildConfig {
            guild_id: id("DISCORD_GUILD_ID")?,
            announce_channel_id: id("DISCORD_ANNOUNCE_CHANNEL_ID")?,
            queue_channel_id: id("DISCORD_QUEUE_CHANNEL_ID")?,
            admitted_channel_id: id("DISCORD_VOICE_CHANNEL_ID")?,
        };

        let llm_backend = match lookup("BOUNCER_LLM_BACKEND")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("openai") => LlmBackend::OpenAi,
            Some("anthropic") => LlmBackend::Anthropic,
            Some("azure") => LlmBackend::Azure {
                endpoint: required("AZURE_OPENAI_ENDPOINT")?,
                api_version: lookup("AZURE_OPENAI_API_VERSION")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "BOUNCER_LLM_BACKEND".into(),
                    message: format!(
                        "unknown backend '{other}' (expected openai, anthropic or azure)"
                    ),
                });
            }
        };

        let fallback_key = match llm_backend {
            LlmBackend::OpenAi => "OPENAI_API_KEY",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::Azure { .. } => "AZURE_OPENAI_API_KEY",
        };
        let llm_api_key = required("BOUNCER_LLM_API_KEY")
            .or_else(|_| required(fallback_key))
            .map_err(|_| ConfigError::MissingEnvVar("BOUNCER_LLM_API_KEY".into()))?;

        let model = lookup("BOUNCER_MODEL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "gpt-5-nano".to_string());

        let persona = lookup("BOUNCER_PERSONA")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let db_path = lookup("BOUNCER_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/history.sqlite3"));

        let judge_timeout = match lookup("BOUNCER_JUDGE_TIMEOUT_SECS") {
            None => Duration::from_secs(60),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "BOUNCER_JUDGE_TIMEOUT_SECS".into(),
                        message: format!("expected a positive number of seconds, got '{raw}'"),
                    });
                }
            },
        };

        Ok(Self {
            discord_token,
            guild,
            llm_backend,
            llm_api_key: SecretString::from(llm_api_key),
            model,
            persona,
            db_path,
            judge_timeout,
        })
    }

    /// Whether the history store should be the volatile in-memory backend.
    pub fn uses_in_memory_store(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY_DB
    }
}
