//! Storage backends for the session
//!
//! The session is persisted through the `SessionStore` trait. `SqliteStore`
//! is the durable implementation; `MemoryStore` backs tests and dry runs.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{read_typed, OpenStore, SessionStore, StorageError, StorageResult, StoreKey};
