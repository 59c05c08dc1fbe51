//! Shared doubles for session integration tests
//!
//! Scripted capture and transcript backends, an observer that records what
//! it receives, and a builder that wires them into a controller.

#![allow(dead_code)]

use async_trait::async_trait;
use mindnote::coordinator::DeliveryError;
use mindnote::{
    CaptureError, CapturedPage, LlmError, MemoryStore, MockGenerator, NoteGenerator, ObserverLink,
    OriginContext, PageRecord, QuizItem, ScreenshotCapturer, ScreenshotRef, SessionController,
    SessionEvent, SessionStore, Transcript, TranscriptError, TranscriptFetcher,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

// === Capture ===

/// Answers captures from a queue; once empty, every capture succeeds with
/// `shot-N`. A held capturer blocks until `release` is called.
#[derive(Default)]
pub struct ScriptedCapturer {
    script: Mutex<VecDeque<Result<ScreenshotRef, CaptureError>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, reference: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Ok(ScreenshotRef::new(reference)));
        self
    }

    pub fn then_fail(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(CaptureError::Failed(message.to_string())));
        self
    }

    pub fn held(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `n` held captures proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenshotCapturer for ScriptedCapturer {
    async fn capture(&self, _origin: &OriginContext) -> Result<ScreenshotRef, CaptureError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| CaptureError::Failed(e.to_string()))?
                .forget();
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(ScreenshotRef::new(format!("shot-{}", n))))
    }
}

// === Transcripts ===

/// Answers fetches from a queue; once empty, every fetch is unavailable.
#[derive(Default)]
pub struct ScriptedTranscripts {
    script: Mutex<VecDeque<Result<Transcript, TranscriptError>>>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedTranscripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, title: &str, transcript: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(Transcript {
            title: Some(title.to_string()),
            transcript: transcript.to_string(),
        }));
        self
    }

    pub fn then_network_error(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(TranscriptError::Network(message.to_string())));
        self
    }

    /// Page URLs fetched so far, in call order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptFetcher for ScriptedTranscripts {
    async fn fetch(
        &self,
        _origin: &OriginContext,
        page_url: &str,
    ) -> Result<Transcript, TranscriptError> {
        self.fetched.lock().unwrap().push(page_url.to_string());
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Err(TranscriptError::Unavailable("not scripted".to_string())))
    }
}

// === Observers ===

/// Keeps every event delivered to it. An unreachable observer rejects
/// deliveries, like a context with no listener.
pub struct RecordingObserver {
    id: String,
    events: Mutex<Vec<SessionEvent>>,
    unreachable: AtomicBool,
}

impl RecordingObserver {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            events: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        })
    }

    pub fn unreachable(id: &str) -> Arc<Self> {
        let observer = Self::new(id);
        observer.unreachable.store(true, Ordering::SeqCst);
        observer
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(SessionEvent::kind).collect()
    }
}

#[async_trait]
impl ObserverLink for RecordingObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, event: &SessionEvent) -> Result<(), DeliveryError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(DeliveryError::Unreachable(self.id.clone()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Takes a delivery and never finishes it, like a host whose pipe is full.
pub struct HungObserver {
    id: String,
}

impl HungObserver {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self { id: id.to_string() })
    }
}

#[async_trait]
impl ObserverLink for HungObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, _event: &SessionEvent) -> Result<(), DeliveryError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// === Generation ===

/// Summarizes as `notes: <urls>`, taking each call's delay from a queue so
/// overlapping requests can be made to finish out of order.
#[derive(Default)]
pub struct PacedGenerator {
    delays: Mutex<VecDeque<Duration>>,
}

impl PacedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_wait(self, delay: Duration) -> Self {
        self.delays.lock().unwrap().push_back(delay);
        self
    }

    pub fn notes_for(urls: &[&str]) -> String {
        format!("notes: {}", urls.join(" "))
    }
}

#[async_trait]
impl NoteGenerator for PacedGenerator {
    async fn summarize(&self, pages: &[CapturedPage]) -> Result<String, LlmError> {
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
        tokio::time::sleep(delay).await;
        let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        Ok(Self::notes_for(&urls))
    }

    async fn quiz(&self, _content: &str, _count: usize) -> Result<Vec<QuizItem>, LlmError> {
        Ok(Vec::new())
    }
}

// === Harness ===

/// A controller over a `MemoryStore` with scripted collaborators.
pub struct Harness {
    pub controller: SessionController,
    pub store: Arc<MemoryStore>,
    pub capturer: Arc<ScriptedCapturer>,
    pub transcripts: Arc<ScriptedTranscripts>,
    pub generator: Arc<MockGenerator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(
            ScriptedCapturer::new(),
            ScriptedTranscripts::new(),
            MockGenerator::new(),
        )
    }

    pub fn with(
        capturer: ScriptedCapturer,
        transcripts: ScriptedTranscripts,
        generator: MockGenerator,
    ) -> Self {
        Self::over_store(Arc::new(MemoryStore::new()), capturer, transcripts, generator)
    }

    pub fn over_store(
        store: Arc<MemoryStore>,
        capturer: ScriptedCapturer,
        transcripts: ScriptedTranscripts,
        generator: MockGenerator,
    ) -> Self {
        let capturer = Arc::new(capturer);
        let transcripts = Arc::new(transcripts);
        let generator = Arc::new(generator);
        let controller = SessionController::open(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&capturer) as Arc<dyn ScreenshotCapturer>,
            Arc::clone(&transcripts) as Arc<dyn TranscriptFetcher>,
            Arc::clone(&generator) as Arc<dyn mindnote::NoteGenerator>,
        )
        .expect("open controller");
        Self {
            controller,
            store,
            capturer,
            transcripts,
            generator,
        }
    }

    /// Start recording, ingest `pages` from one tab, and wait for enrichment.
    pub async fn record(&self, pages: Vec<PageRecord>) {
        self.controller.start_recording().await.expect("start");
        let tab = origin("tab-1");
        for page in pages {
            self.controller.ingest(page, &tab).await.expect("ingest");
        }
        self.controller.settle().await;
    }
}

pub fn origin(id: &str) -> OriginContext {
    OriginContext::new(id)
}

pub fn page(url: &str, title: &str) -> PageRecord {
    PageRecord::new(url, title).with_paragraph(format!("About {}", title))
}
