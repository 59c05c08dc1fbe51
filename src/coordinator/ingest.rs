//! Deduplicating commit path for page records and enrichment results
//!
//! Every mutation of the record sequence goes through here:
//! 1. Apply the change to `SessionState` under the session lock
//! 2. Persist the whole sequence as one write
//! 3. Publish `RecordsUpdated` while still holding the lock
//!
//! Holding the lock through step 3 keeps broadcasts in commit order. If the
//! write fails the in-memory change is rolled back and nothing is published.

use super::bus::BroadcastBus;
use super::events::SessionEvent;
use crate::session::{
    CapturedPage, EnrichmentUpdate, PageRecord, SessionResult, SessionState, UpsertOutcome,
};
use crate::storage::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which enrichment tasks a commit calls for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentPlan {
    pub screenshot: bool,
    /// Video id to fetch a transcript for.
    pub transcript_video: Option<String>,
}

impl EnrichmentPlan {
    /// New or changed content gets both tasks; an unchanged page only
    /// re-requests what it is still missing.
    fn after_commit(outcome: UpsertOutcome, page: &CapturedPage) -> Self {
        match outcome {
            UpsertOutcome::Inserted | UpsertOutcome::Updated => Self {
                screenshot: true,
                transcript_video: page.video_id.clone(),
            },
            UpsertOutcome::Unchanged => Self {
                screenshot: page.needs_screenshot(),
                transcript_video: page.pending_transcript().map(str::to_string),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.screenshot && self.transcript_video.is_none()
    }
}

/// Result of committing one page record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub url: String,
    pub outcome: UpsertOutcome,
    pub plan: EnrichmentPlan,
}

/// Result of an ingest attempt. `NotRecording` is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted(CommitReport),
    NotRecording,
}

/// Result of merging one enrichment result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// The page already held this value, or a better one.
    Unchanged,
    /// The page is no longer in the session.
    Stale,
}

pub struct IngestPipeline {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn SessionStore>,
    bus: Arc<BroadcastBus>,
}

impl IngestPipeline {
    pub fn new(
        state: Arc<Mutex<SessionState>>,
        store: Arc<dyn SessionStore>,
        bus: Arc<BroadcastBus>,
    ) -> Self {
        Self { state, store, bus }
    }

    pub async fn is_recording(&self) -> bool {
        self.state.lock().await.is_recording()
    }

    /// Insert or update the entry for `record.url`.
    ///
    /// Content fields are replaced by the newest observation; enrichment
    /// fields are kept. The caller schedules the returned plan.
    pub async fn commit(&self, record: PageRecord) -> SessionResult<CommitReport> {
        record.validate()?;
        let mut state = self.state.lock().await;
        self.commit_locked(&mut state, record)
    }

    /// Like `commit`, but only while the session is recording. The phase is
    /// checked under the same lock as the write.
    pub async fn commit_while_recording(&self, record: PageRecord) -> SessionResult<IngestOutcome> {
        record.validate()?;
        let mut state = self.state.lock().await;
        if !state.is_recording() {
            tracing::debug!(url = %record.url, "not recording, page ignored");
            return Ok(IngestOutcome::NotRecording);
        }
        self.commit_locked(&mut state, record).map(IngestOutcome::Accepted)
    }

    fn commit_locked(
        &self,
        state: &mut SessionState,
        record: PageRecord,
    ) -> SessionResult<CommitReport> {
        let url = record.url.clone();
        let previous = state.records().to_vec();
        let outcome = state.upsert(record, Utc::now());

        let plan = state
            .find(&url)
            .map(|page| EnrichmentPlan::after_commit(outcome, page))
            .unwrap_or_default();

        if outcome != UpsertOutcome::Unchanged {
            self.persist_and_publish(state, previous)?;
        }

        tracing::info!(url = %url, ?outcome, records = state.records().len(), "page committed");
        Ok(CommitReport { url, outcome, plan })
    }

    /// Merge one enrichment result into the current entry for `url`.
    ///
    /// Only the field the update names is touched, re-read under the lock,
    /// so concurrent completions for the same page commute.
    pub async fn merge_enrichment(
        &self,
        url: &str,
        update: EnrichmentUpdate,
    ) -> SessionResult<MergeOutcome> {
        let mut state = self.state.lock().await;
        let previous = state.records().to_vec();

        match state.apply_enrichment(url, update) {
            None => {
                tracing::debug!(url, "enrichment for removed page dropped");
                Ok(MergeOutcome::Stale)
            }
            Some(false) => Ok(MergeOutcome::Unchanged),
            Some(true) => {
                self.persist_and_publish(&mut state, previous)?;
                Ok(MergeOutcome::Applied)
            }
        }
    }

    /// Remove the entry for `url`. Returns whether one existed.
    ///
    /// The record sequence is broadcast either way.
    pub async fn remove(&self, url: &str) -> SessionResult<bool> {
        let mut state = self.state.lock().await;
        let previous = state.records().to_vec();

        if state.remove(url) {
            self.persist_and_publish(&mut state, previous)?;
            tracing::info!(url, "page removed");
            Ok(true)
        } else {
            self.bus.publish(SessionEvent::RecordsUpdated {
                records: state.records().to_vec(),
            });
            Ok(false)
        }
    }

    fn persist_and_publish(
        &self,
        state: &mut SessionState,
        previous: Vec<CapturedPage>,
    ) -> SessionResult<()> {
        let written = state
            .records_entry()
            .and_then(|(key, value)| self.store.put(key, value));

        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to persist records, rolling back");
            state.restore_records(previous);
            return Err(e.into());
        }

        self.bus.publish(SessionEvent::RecordsUpdated {
            records: state.records().to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ScreenshotRef, SessionError};
    use crate::storage::{read_typed, MemoryStore, StoreKey};

    fn pipeline(store: Arc<MemoryStore>) -> (IngestPipeline, Arc<Mutex<SessionState>>, Arc<BroadcastBus>) {
        let state = Arc::new(Mutex::new(SessionState::new()));
        let bus = Arc::new(BroadcastBus::new());
        let pipeline = IngestPipeline::new(state.clone(), store, bus.clone());
        (pipeline, state, bus)
    }

    fn stored_urls(store: &MemoryStore) -> Vec<String> {
        let pages: Vec<CapturedPage> = read_typed(store, StoreKey::Records).unwrap().unwrap_or_default();
        pages.into_iter().map(|p| p.url).collect()
    }

    #[tokio::test]
    async fn new_page_is_persisted_and_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, _, bus) = pipeline(store.clone());
        let mut rx = bus.subscribe();

        let report = pipeline.commit(PageRecord::new("https://a", "A")).await.unwrap();

        assert_eq!(report.outcome, UpsertOutcome::Inserted);
        assert!(report.plan.screenshot);
        assert_eq!(report.plan.transcript_video, None);
        assert_eq!(stored_urls(&store), vec!["https://a"]);
        match rx.recv().await.unwrap() {
            SessionEvent::RecordsUpdated { records } => assert_eq!(records.len(), 1),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn idle_session_ignores_pages() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, state, _) = pipeline(store.clone());

        let outcome = pipeline
            .commit_while_recording(PageRecord::new("https://a", "A"))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::NotRecording);
        assert!(store.is_empty());

        state.lock().await.set_phase(crate::session::SessionPhase::Recording);
        let outcome = pipeline
            .commit_while_recording(PageRecord::new("https://a", "A"))
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Accepted(_)));
    }

    #[tokio::test]
    async fn video_page_plans_transcript() {
        let (pipeline, _, _) = pipeline(Arc::new(MemoryStore::new()));
        let report = pipeline
            .commit(PageRecord::new("https://www.youtube.com/watch?v=xyz", "V").with_video_id("xyz"))
            .await
            .unwrap();
        assert_eq!(report.plan.transcript_video.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn unchanged_commit_writes_nothing_and_plans_only_missing() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, _, bus) = pipeline(store.clone());
        pipeline.commit(PageRecord::new("https://a", "A")).await.unwrap();
        pipeline
            .merge_enrichment("https://a", EnrichmentUpdate::ScreenshotCaptured(ScreenshotRef::new("s1")))
            .await
            .unwrap();

        let mut rx = bus.subscribe();
        store.set_fail_writes(true);
        let report = pipeline.commit(PageRecord::new("https://a", "A")).await.unwrap();

        assert_eq!(report.outcome, UpsertOutcome::Unchanged);
        assert!(report.plan.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_write_rolls_back_and_is_not_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, state, bus) = pipeline(store.clone());
        pipeline.commit(PageRecord::new("https://a", "A")).await.unwrap();

        let mut rx = bus.subscribe();
        store.set_fail_writes(true);
        let err = pipeline.commit(PageRecord::new("https://b", "B")).await.unwrap_err();

        assert!(matches!(err, SessionError::Storage(_)));
        assert_eq!(state.lock().await.records().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn invalid_record_is_rejected_before_any_change() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, state, _) = pipeline(store.clone());
        let err = pipeline.commit(PageRecord::new("  ", "blank")).await.unwrap_err();
        assert!(matches!(err, SessionError::MissingField("url")));
        assert!(state.lock().await.records().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn enrichment_for_removed_page_is_stale() {
        let (pipeline, _, _) = pipeline(Arc::new(MemoryStore::new()));
        pipeline.commit(PageRecord::new("https://a", "A")).await.unwrap();
        assert!(pipeline.remove("https://a").await.unwrap());

        let outcome = pipeline
            .merge_enrichment("https://a", EnrichmentUpdate::ScreenshotCaptured(ScreenshotRef::new("s")))
            .await
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Stale);
    }

    #[tokio::test]
    async fn failure_after_success_leaves_transcript() {
        let (pipeline, state, _) = pipeline(Arc::new(MemoryStore::new()));
        pipeline
            .commit(PageRecord::new("https://v", "V").with_video_id("v"))
            .await
            .unwrap();
        pipeline
            .merge_enrichment(
                "https://v",
                EnrichmentUpdate::TranscriptFetched {
                    title: None,
                    transcript: "words".into(),
                },
            )
            .await
            .unwrap();
        let outcome = pipeline
            .merge_enrichment("https://v", EnrichmentUpdate::TranscriptFailed("down".into()))
            .await
            .unwrap();

        assert_eq!(outcome, MergeOutcome::Unchanged);
        let state = state.lock().await;
        assert_eq!(state.find("https://v").unwrap().transcript.as_deref(), Some("words"));
    }

    #[tokio::test]
    async fn removing_absent_url_still_broadcasts() {
        let store = Arc::new(MemoryStore::new());
        let (pipeline, _, bus) = pipeline(store.clone());
        let mut rx = bus.subscribe();

        assert!(!pipeline.remove("https://nowhere").await.unwrap());
        assert!(!pipeline.remove("https://nowhere").await.unwrap());

        assert!(store.is_empty());
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::RecordsUpdated { .. }));
    }
}
