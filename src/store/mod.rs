//! Persistence layer: per-user conversation history and blacklist flags.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlHistoryStore;
pub use memory::InMemoryHistoryStore;
pub use traits::{HistoryStore, decode_batch, encode_batch};
