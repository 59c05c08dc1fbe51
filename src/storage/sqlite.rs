//! SQLite storage backend

use super::traits::{OpenStore, SessionStore, StorageResult, StoreKey};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed session store
///
/// One `kv` table, one row per `StoreKey`. Thread-safe via internal
/// mutex on the connection; multi-key writes run in a single transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Readers (UI surfaces, CLI) may open the file while the coordinator writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl SessionStore for SqliteStore {
    fn get(&self, key: StoreKey) -> StorageResult<Option<Value>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value_json FROM kv WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put_many(&self, entries: &[(StoreKey, Value)]) -> StorageResult<()> {
        // Serialize everything up front so a bad value aborts before any write
        let rows = entries
            .iter()
            .map(|(key, value)| -> StorageResult<(&'static str, String)> {
                Ok((key.as_str(), serde_json::to_string(value)?))
            })
            .collect::<StorageResult<Vec<_>>>()?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for (key, json) in &rows {
            tx.execute(
                r#"
                INSERT INTO kv (key, value_json, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at
                "#,
                params![key, json, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
