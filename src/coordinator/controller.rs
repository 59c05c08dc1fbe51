//! SessionController: the coordinator's message dispatcher
//!
//! Owns the recording state machine (`Idle <-> Recording`) and maps inbound
//! requests onto the ingest pipeline, enrichment workers, note generator and
//! broadcast bus. Cheap to clone; clones share one session.

use super::bus::{BroadcastBus, ObserverLink};
use super::enrichment::{EnrichmentTask, EnrichmentWorkers, ScreenshotCapturer};
use super::events::SessionEvent;
use super::ingest::{IngestOutcome, IngestPipeline};
use super::protocol::{Ack, ActionMessage, InboundMessage, QuizReply, Reply, TypedMessage};
use crate::llm::NoteGenerator;
use crate::session::{
    CapturedPage, OriginContext, PageRecord, SessionPhase, SessionResult, SessionSnapshot,
    SessionState,
};
use crate::storage::{SessionStore, StoreKey};
use crate::transcript::TranscriptFetcher;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Upper bound on questions per quiz request.
pub const MAX_QUIZ_QUESTIONS: usize = 20;

/// Outcome of `clear`. The in-memory clear always happens; `persist_error`
/// reports whether the cleared state reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub cleared: usize,
    pub persist_error: Option<String>,
}

impl ClearReport {
    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }
}

#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn SessionStore>,
    bus: Arc<BroadcastBus>,
    pipeline: Arc<IngestPipeline>,
    workers: EnrichmentWorkers,
    generator: Arc<dyn NoteGenerator>,
    enrichments: std::sync::Mutex<Vec<JoinHandle<EnrichmentTask>>>,
    generations: std::sync::Mutex<Vec<JoinHandle<()>>>,
    /// Ticket handed to the next generation request.
    next_generation: AtomicU64,
    /// Ticket of the newest generation whose notes were applied.
    applied_generation: AtomicU64,
}

impl SessionController {
    /// Load the session from `store` and wire up its collaborators.
    ///
    /// Must be called inside a tokio runtime.
    pub fn open(
        store: Arc<dyn SessionStore>,
        capturer: Arc<dyn ScreenshotCapturer>,
        transcripts: Arc<dyn TranscriptFetcher>,
        generator: Arc<dyn NoteGenerator>,
    ) -> SessionResult<Self> {
        let loaded = SessionState::load(store.as_ref())?;
        tracing::info!(
            recording = loaded.is_recording(),
            records = loaded.records().len(),
            "session loaded"
        );

        let state = Arc::new(Mutex::new(loaded));
        let bus = Arc::new(BroadcastBus::new());
        let pipeline = Arc::new(IngestPipeline::new(
            Arc::clone(&state),
            Arc::clone(&store),
            Arc::clone(&bus),
        ));
        let workers = EnrichmentWorkers::new(Arc::clone(&pipeline), capturer, transcripts);

        Ok(Self {
            inner: Arc::new(Inner {
                state,
                store,
                bus,
                pipeline,
                workers,
                generator,
                enrichments: std::sync::Mutex::new(Vec::new()),
                generations: std::sync::Mutex::new(Vec::new()),
                next_generation: AtomicU64::new(1),
                applied_generation: AtomicU64::new(0),
            }),
        })
    }

    /// Write defaults for the recording flag and record sequence if the
    /// store has never held them.
    pub async fn initialize(&self) -> SessionResult<()> {
        let state = self.inner.state.lock().await;
        let mut missing: Vec<(StoreKey, Value)> = Vec::new();

        if self.inner.store.get(StoreKey::Recording)?.is_none() {
            missing.push(state.recording_entry());
        }
        if self.inner.store.get(StoreKey::Records)?.is_none() {
            missing.push(state.records_entry()?);
        }
        if !missing.is_empty() {
            tracing::info!(keys = missing.len(), "initializing store defaults");
            self.inner.store.put_many(&missing)?;
        }
        Ok(())
    }

    // === Broadcast wiring ===

    /// Listen as a UI surface.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.bus.subscribe()
    }

    pub fn attach_observer(&self, link: Arc<dyn ObserverLink>) {
        self.inner.bus.attach_observer(link);
    }

    pub fn detach_observer(&self, id: &str) -> bool {
        self.inner.bus.detach_observer(id)
    }

    // === Recording state machine ===

    /// Enter `Recording` and tell every observer to ingest its page.
    ///
    /// Calling it while already recording only re-broadcasts. The phase
    /// changes in memory even if the store write fails; that failure is
    /// returned after the broadcast.
    pub async fn start_recording(&self) -> SessionResult<()> {
        self.transition(SessionPhase::Recording, SessionEvent::RecordingStarted)
            .await
    }

    pub async fn stop_recording(&self) -> SessionResult<()> {
        self.transition(SessionPhase::Idle, SessionEvent::RecordingStopped)
            .await
    }

    async fn transition(&self, phase: SessionPhase, event: SessionEvent) -> SessionResult<()> {
        let mut state = self.inner.state.lock().await;
        if state.set_phase(phase) {
            tracing::info!(?phase, "session phase changed");
        }

        let (key, value) = state.recording_entry();
        let written = self.inner.store.put(key, value);
        if let Err(e) = &written {
            tracing::warn!(?phase, error = %e, "failed to persist recording flag");
        }

        self.inner.bus.publish(event);
        written.map_err(Into::into)
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.state.lock().await.is_recording()
    }

    // === Records ===

    /// Commit a page while recording and schedule its enrichment.
    ///
    /// Returns `NotRecording` when idle; `records` is left untouched.
    pub async fn ingest(
        &self,
        record: PageRecord,
        origin: &OriginContext,
    ) -> SessionResult<IngestOutcome> {
        let outcome = self.inner.pipeline.commit_while_recording(record).await?;

        if let IngestOutcome::Accepted(report) = &outcome {
            let handles = self.inner.workers.schedule(report, origin);
            let mut pending = lock(&self.inner.enrichments);
            pending.retain(|h| !h.is_finished());
            pending.extend(handles);
        }
        Ok(outcome)
    }

    /// Remove the page for `url`; a missing URL is not an error.
    pub async fn remove(&self, url: &str) -> SessionResult<bool> {
        self.inner.pipeline.remove(url).await
    }

    /// Drop all records and the summary.
    pub async fn clear(&self) -> ClearReport {
        let mut state = self.inner.state.lock().await;
        let cleared = state.clear();

        let entries = vec![
            (StoreKey::Records, Value::Array(Vec::new())),
            (StoreKey::Summary, Value::Null),
            (StoreKey::SummarySources, Value::Null),
        ];
        let persist_error = self.inner.store.put_many(&entries).err().map(|e| {
            tracing::warn!(error = %e, "cleared session not persisted");
            e.to_string()
        });

        tracing::info!(cleared, "session cleared");
        self.inner.bus.publish(SessionEvent::RecordsUpdated {
            records: Vec::new(),
        });
        ClearReport {
            cleared,
            persist_error,
        }
    }

    // === Generation ===

    /// Summarize `records`, or the session's records when `None`.
    ///
    /// Always yields a displayable string: a failed summarization stores and
    /// returns `ERROR: ...`. The summary and its source URLs are stored
    /// together or not at all. `NotesGenerated` is published either way; a
    /// failed write is returned as the error. When requests overlap, the
    /// most recently issued one wins regardless of finishing order.
    pub async fn generate(&self, records: Option<Vec<PageRecord>>) -> SessionResult<String> {
        let ticket = self.take_generation_ticket();
        self.generate_ticketed(ticket, records).await
    }

    fn take_generation_ticket(&self) -> u64 {
        self.inner.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    /// Results of a request older than the newest applied one are returned
    /// to the caller but neither stored nor published.
    async fn generate_ticketed(
        &self,
        ticket: u64,
        records: Option<Vec<PageRecord>>,
    ) -> SessionResult<String> {
        let pages: Vec<CapturedPage> = match records {
            Some(records) => records.into_iter().map(CapturedPage::from).collect(),
            None => self.inner.state.lock().await.records().to_vec(),
        };
        let sources: Vec<String> = pages.iter().map(|p| p.url.clone()).collect();

        tracing::info!(pages = pages.len(), "generating notes");
        let notes = match self.inner.generator.summarize(&pages).await {
            Ok(notes) => notes,
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed");
                e.to_notes()
            }
        };

        let mut state = self.inner.state.lock().await;
        if ticket < self.inner.applied_generation.load(Ordering::SeqCst) {
            tracing::debug!(ticket, "newer notes already applied, dropping stale result");
            return Ok(notes);
        }
        self.inner.applied_generation.store(ticket, Ordering::SeqCst);
        let previous = (
            state.summary().map(str::to_string),
            state.summary_sources().map(<[String]>::to_vec),
        );
        state.set_summary(notes.clone(), sources);

        let written = state
            .summary_entries()
            .and_then(|entries| self.inner.store.put_many(&entries));
        if let Err(e) = &written {
            tracing::warn!(error = %e, "summary not persisted, keeping previous");
            let (summary, sources) = previous;
            state.restore_summary(summary, sources);
        }

        self.inner.bus.publish(SessionEvent::NotesGenerated {
            notes: notes.clone(),
        });
        written?;
        Ok(notes)
    }

    /// Build a quiz of up to `count` questions from `content`.
    ///
    /// `count` is clamped to `1..=20`. Empty content is answered with an
    /// error without calling the generator.
    pub async fn generate_quiz(&self, content: &str, count: usize) -> QuizReply {
        if content.trim().is_empty() {
            return QuizReply::Error("No notes available to build a quiz from.".to_string());
        }
        let count = count.clamp(1, MAX_QUIZ_QUESTIONS);

        if let Err(e) = self
            .inner
            .store
            .put(StoreKey::QuizSource, Value::String(content.to_string()))
        {
            tracing::warn!(error = %e, "quiz source not persisted");
        }

        match self.inner.generator.quiz(content, count).await {
            Ok(mut items) => {
                items.truncate(count);
                tracing::info!(questions = items.len(), "quiz generated");
                QuizReply::Quiz(items)
            }
            Err(e) => {
                tracing::warn!(error = %e, "quiz generation failed");
                QuizReply::Error(e.to_string())
            }
        }
    }

    // === Observers ===

    /// An observer finished loading a page. While recording, ask just that
    /// observer to ingest it.
    pub async fn page_loaded(&self, origin: &OriginContext) {
        if self.is_recording().await {
            tracing::debug!(observer = %origin.id, "page loaded while recording");
            self.inner
                .bus
                .send_to(&origin.id, SessionEvent::RecordingStarted);
        }
    }

    // === Reads ===

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    /// Wait for in-flight enrichment and generation tasks, then for the
    /// observer queue to drain.
    pub async fn settle(&self) {
        loop {
            let enrichments = std::mem::take(&mut *lock(&self.inner.enrichments));
            let generations = std::mem::take(&mut *lock(&self.inner.generations));
            if enrichments.is_empty() && generations.is_empty() {
                break;
            }
            for handle in enrichments {
                let _ = handle.await;
            }
            for handle in generations {
                let _ = handle.await;
            }
        }
        self.inner.bus.flush().await;
    }

    // === Dispatch ===

    /// Handle a raw wire message from `origin`.
    pub async fn dispatch_raw(&self, raw: &str, origin: &OriginContext) -> Reply {
        match InboundMessage::parse(raw) {
            Ok(message) => self.dispatch(message, origin).await,
            Err(e) => {
                tracing::debug!(observer = %origin.id, error = %e, "rejected message");
                e.into()
            }
        }
    }

    /// Handle one inbound message and produce its reply.
    ///
    /// `generateNotes` is acknowledged at once; the notes arrive later as a
    /// `NotesGenerated` event.
    pub async fn dispatch(&self, message: InboundMessage, origin: &OriginContext) -> Reply {
        let action = match message {
            InboundMessage::Typed(TypedMessage::GenerateQuiz { content, count }) => {
                return self.generate_quiz(&content, count).await.into();
            }
            InboundMessage::Action(action) => action,
        };

        let ack = match action {
            ActionMessage::StartRecording => ack(self.start_recording().await),
            ActionMessage::StopRecording => ack(self.stop_recording().await),
            ActionMessage::ContentExtracted { page_data } => {
                match self.ingest(page_data, origin).await {
                    Ok(IngestOutcome::Accepted(_)) => Ack::ok(),
                    Ok(IngestOutcome::NotRecording) => Ack::failed("not recording"),
                    Err(e) => Ack::failed(e.to_string()),
                }
            }
            ActionMessage::WebsiteRemoved { url } => ack(self.remove(&url).await),
            ActionMessage::GenerateNotes { records } => {
                self.spawn_generation(records);
                Ack::ok()
            }
            ActionMessage::ClearSession => {
                let report = self.clear().await;
                match report.persist_error {
                    None => Ack::ok(),
                    Some(error) => Ack::failed(error),
                }
            }
            ActionMessage::PageLoaded => {
                self.page_loaded(origin).await;
                Ack::ok()
            }
        };
        ack.into()
    }

    fn spawn_generation(&self, records: Option<Vec<PageRecord>>) {
        let controller = self.clone();
        let ticket = self.take_generation_ticket();
        let handle = tokio::spawn(async move {
            if let Err(e) = controller.generate_ticketed(ticket, records).await {
                tracing::warn!(error = %e, "generated notes not stored");
            }
        });
        let mut pending = lock(&self.inner.generations);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

fn ack<T>(result: SessionResult<T>) -> Ack {
    match result {
        Ok(_) => Ack::ok(),
        Err(e) => Ack::failed(e.to_string()),
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
