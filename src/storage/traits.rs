//! Storage trait definitions

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The persisted session schema.
///
/// Key names match what observers and UI surfaces read directly from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// `bool`: whether ingestion is accepted
    Recording,
    /// `[CapturedPage]`: the ordered record set
    Records,
    /// `string | null`: last generated notes
    Summary,
    /// `[url] | null`: URLs the last notes were generated from
    SummarySources,
    /// `string`: text the last quiz was generated from
    QuizSource,
}

impl StoreKey {
    pub const ALL: [StoreKey; 5] = [
        StoreKey::Recording,
        StoreKey::Records,
        StoreKey::Summary,
        StoreKey::SummarySources,
        StoreKey::QuizSource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Recording => "isRecording",
            StoreKey::Records => "capturedWebsites",
            StoreKey::Summary => "generatedNotes",
            StoreKey::SummarySources => "recordedSources",
            StoreKey::QuizSource => "notesForQuiz",
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable key-value map that survives coordinator restarts.
///
/// Values are JSON; a stored `null` reads back as absent. Implementations
/// must be thread-safe (Send + Sync). The coordinator is the only writer,
/// so implementations need not arbitrate between concurrent writers.
pub trait SessionStore: Send + Sync {
    /// Read one key
    fn get(&self, key: StoreKey) -> StorageResult<Option<Value>>;

    /// Write several keys atomically: either every entry lands or none does
    fn put_many(&self, entries: &[(StoreKey, Value)]) -> StorageResult<()>;

    /// Write a single key
    fn put(&self, key: StoreKey, value: Value) -> StorageResult<()> {
        self.put_many(&[(key, value)])
    }
}

/// Extension trait for opening stores from paths
pub trait OpenStore: SessionStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

/// Read a key and deserialize it, treating `null` as absent.
pub fn read_typed<T: DeserializeOwned>(
    store: &dyn SessionStore,
    key: StoreKey,
) -> StorageResult<Option<T>> {
    match store.get(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}
