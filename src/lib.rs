//! Bouncer: LLM-judged admission from a voice-channel queue.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod judge;
pub mod llm;
pub mod store;
