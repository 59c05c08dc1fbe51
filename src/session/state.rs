//! SessionState: the coordinator's mirror of the persisted session

use super::page::{CapturedPage, EnrichmentUpdate, PageRecord};
use crate::storage::{read_typed, SessionStore, StorageResult, StoreKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state. `Idle --start--> Recording --stop--> Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Recording,
}

impl SessionPhase {
    pub fn from_flag(recording: bool) -> Self {
        if recording {
            Self::Recording
        } else {
            Self::Idle
        }
    }

    pub fn is_recording(self) -> bool {
        self == Self::Recording
    }
}

/// What an upsert did to the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First observation of this URL; appended at the end
    Inserted,
    /// Existing entry's content fields replaced in place
    Updated,
    /// Same content fingerprint as the stored entry; nothing changed
    Unchanged,
}

/// Immutable copy of the session handed to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub recording: bool,
    pub records: Vec<CapturedPage>,
    pub summary: Option<String>,
    pub summary_sources: Option<Vec<String>>,
}

/// In-memory session: recording phase, ordered records, last summary.
///
/// Holds at most one `CapturedPage` per URL (exact, case-sensitive match).
/// Insertion order is preserved.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    phase: SessionPhase,
    records: Vec<CapturedPage>,
    summary: Option<String>,
    summary_sources: Option<Vec<String>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the session from the store; absent keys take their defaults.
    pub fn load(store: &dyn SessionStore) -> StorageResult<Self> {
        let recording: bool = read_typed(store, StoreKey::Recording)?.unwrap_or(false);
        let stored: Vec<CapturedPage> = read_typed(store, StoreKey::Records)?.unwrap_or_default();

        // Collapse duplicates a foreign writer may have left behind; last entry wins
        let mut records: Vec<CapturedPage> = Vec::with_capacity(stored.len());
        for page in stored {
            match records.iter().position(|p| p.url == page.url) {
                Some(idx) => records[idx] = page,
                None => records.push(page),
            }
        }

        Ok(Self {
            phase: SessionPhase::from_flag(recording),
            records,
            summary: read_typed(store, StoreKey::Summary)?,
            summary_sources: read_typed(store, StoreKey::SummarySources)?,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase.is_recording()
    }

    /// Returns true if the phase changed.
    pub fn set_phase(&mut self, phase: SessionPhase) -> bool {
        let changed = self.phase != phase;
        self.phase = phase;
        changed
    }

    pub fn records(&self) -> &[CapturedPage] {
        &self.records
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn summary_sources(&self) -> Option<&[String]> {
        self.summary_sources.as_deref()
    }

    pub fn find(&self, url: &str) -> Option<&CapturedPage> {
        self.records.iter().find(|p| p.url == url)
    }

    /// Insert a new entry or replace the content fields of the existing one.
    pub fn upsert(&mut self, record: PageRecord, now: DateTime<Utc>) -> UpsertOutcome {
        match self.records.iter_mut().find(|p| p.url == record.url) {
            Some(existing) => {
                if existing.fingerprint == record.fingerprint() {
                    return UpsertOutcome::Unchanged;
                }
                existing.replace_content(record, now);
                UpsertOutcome::Updated
            }
            None => {
                self.records.push(CapturedPage::from_record(record, now));
                UpsertOutcome::Inserted
            }
        }
    }

    /// Merge an enrichment result into the current entry for `url`.
    ///
    /// Returns `None` if the URL is no longer in the session (removed or
    /// cleared while the task was in flight), otherwise whether it changed.
    pub fn apply_enrichment(&mut self, url: &str, update: EnrichmentUpdate) -> Option<bool> {
        self.records
            .iter_mut()
            .find(|p| p.url == url)
            .map(|page| page.apply_enrichment(update))
    }

    /// Returns true if an entry was removed.
    pub fn remove(&mut self, url: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|p| p.url != url);
        self.records.len() != before
    }

    /// Put back a record sequence taken before a mutation whose write failed.
    pub(crate) fn restore_records(&mut self, records: Vec<CapturedPage>) {
        self.records = records;
    }

    /// Put back a summary and attribution taken before a failed write.
    pub(crate) fn restore_summary(&mut self, summary: Option<String>, sources: Option<Vec<String>>) {
        self.summary = summary;
        self.summary_sources = sources;
    }

    /// Drop all records and the summary. Returns how many records were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.records.len();
        self.records.clear();
        self.summary = None;
        self.summary_sources = None;
        dropped
    }

    /// Replace the summary and its attribution together.
    pub fn set_summary(&mut self, summary: String, sources: Vec<String>) {
        self.summary = Some(summary);
        self.summary_sources = Some(sources);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            recording: self.is_recording(),
            records: self.records.clone(),
            summary: self.summary.clone(),
            summary_sources: self.summary_sources.clone(),
        }
    }

    // === Persistence entries ===

    pub fn recording_entry(&self) -> (StoreKey, Value) {
        (StoreKey::Recording, Value::Bool(self.is_recording()))
    }

    /// The whole record sequence, written as one value.
    pub fn records_entry(&self) -> StorageResult<(StoreKey, Value)> {
        Ok((StoreKey::Records, serde_json::to_value(&self.records)?))
    }

    pub fn summary_entries(&self) -> StorageResult<[(StoreKey, Value); 2]> {
        Ok([
            (StoreKey::Summary, serde_json::to_value(&self.summary)?),
            (
                StoreKey::SummarySources,
                serde_json::to_value(&self.summary_sources)?,
            ),
        ])
    }
}
