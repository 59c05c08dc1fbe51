//! Notifications fanned out after committed mutations

use crate::session::CapturedPage;
use serde::{Deserialize, Serialize};

/// A state-change notification.
///
/// Serialized with a `kind` tag, e.g. `{"kind":"recordingStarted"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEvent {
    /// Observers should ingest their currently-loaded page.
    RecordingStarted,
    /// Observers should stop ingesting.
    RecordingStopped,
    /// The full record sequence after a commit.
    RecordsUpdated { records: Vec<CapturedPage> },
    /// A generation finished; `notes` may be an `ERROR: ...` string.
    NotesGenerated { notes: String },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::RecordingStarted => "recordingStarted",
            SessionEvent::RecordingStopped => "recordingStopped",
            SessionEvent::RecordsUpdated { .. } => "recordsUpdated",
            SessionEvent::NotesGenerated { .. } => "notesGenerated",
        }
    }
}
