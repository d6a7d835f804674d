//! Judgment service: decides whether a queued user gets in.
//!
//! The gate only depends on the `Judge` trait. `LlmJudge` is the production
//! implementation; tests script verdicts directly.

mod llm_judge;

pub use llm_judge::LlmJudge;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::JudgeError;
use crate::llm::ChatMessage;

/// Three-way outcome of a judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "let_in", alias = "admit")]
    Admit,
    #[serde(rename = "dont_let_in", alias = "reject")]
    Reject,
    #[serde(rename = "needs_further_assessment", alias = "defer")]
    Defer,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Admit => "admit",
            Decision::Reject => "reject",
            Decision::Defer => "defer",
        }
    }
}

/// A decision plus the text that goes back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    /// Shown to the user.
    pub reply: String,
    /// Internal reasoning; logged, never shown.
    pub rationale: String,
}

impl Verdict {
    pub fn new(decision: Decision, reply: impl Into<String>) -> Self {
        Self {
            decision,
            reply: reply.into(),
            rationale: String::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

/// Everything the judge gets to see for one exchange.
#[derive(Debug, Clone)]
pub struct JudgmentRequest {
    pub content: String,
    /// Supplementary evidence, e.g. the sender's avatar.
    pub image_url: Option<String>,
    /// Prior turns, oldest first.
    pub history: Vec<ChatMessage>,
    pub display_name: String,
}

/// The judge's answer plus the turns this exchange produced.
#[derive(Debug, Clone)]
pub struct Judgment {
    pub verdict: Verdict,
    /// New turns to persist as one batch.
    pub batch: Vec<ChatMessage>,
}

/// Judgment service.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, request: JudgmentRequest) -> Result<Judgment, JudgeError>;
}
