//! Session management — per-user conversation turns held in a bounded,
//! in-memory history store. Nothing here outlives the process.

pub mod store;
pub mod types;

pub use store::{DEFAULT_WINDOW, HistoryStore};
pub use types::{Role, Turn, UserId};
