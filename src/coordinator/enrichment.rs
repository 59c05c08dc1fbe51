//! Enrichment workers: screenshot and transcript tasks spawned after a commit
//!
//! Tasks are fire-and-forget relative to `commit`. Each one merges its single
//! field back through `IngestPipeline::merge_enrichment`, which re-reads the
//! current entry, so completions may land in any order.

use super::ingest::{CommitReport, IngestPipeline};
use crate::session::{EnrichmentUpdate, OriginContext, ScreenshotRef};
use crate::transcript::TranscriptFetcher;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentKind {
    Screenshot,
    Transcript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Done,
    Failed,
    /// Not attempted, e.g. recording stopped before capture.
    Skipped,
}

/// One in-flight enrichment. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentTask {
    pub id: Uuid,
    pub target_url: String,
    pub kind: EnrichmentKind,
    pub state: TaskState,
}

impl EnrichmentTask {
    fn new(target_url: &str, kind: EnrichmentKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_url: target_url.to_string(),
            kind,
            state: TaskState::Pending,
        }
    }

    fn finish(mut self, state: TaskState) -> Self {
        self.state = state;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture unavailable: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

/// Captures the visible surface of the context that produced a record.
#[async_trait]
pub trait ScreenshotCapturer: Send + Sync {
    async fn capture(&self, origin: &OriginContext) -> Result<ScreenshotRef, CaptureError>;
}

/// Used when the host has no way to capture its surface.
pub struct UnavailableCapturer;

#[async_trait]
impl ScreenshotCapturer for UnavailableCapturer {
    async fn capture(&self, _origin: &OriginContext) -> Result<ScreenshotRef, CaptureError> {
        Err(CaptureError::Unavailable("no capture backend".to_string()))
    }
}

#[derive(Clone)]
pub struct EnrichmentWorkers {
    pipeline: Arc<IngestPipeline>,
    capturer: Arc<dyn ScreenshotCapturer>,
    transcripts: Arc<dyn TranscriptFetcher>,
}

impl EnrichmentWorkers {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        capturer: Arc<dyn ScreenshotCapturer>,
        transcripts: Arc<dyn TranscriptFetcher>,
    ) -> Self {
        Self {
            pipeline,
            capturer,
            transcripts,
        }
    }

    /// Spawn the tasks the commit's plan calls for. Returns immediately.
    pub fn schedule(
        &self,
        report: &CommitReport,
        origin: &OriginContext,
    ) -> Vec<JoinHandle<EnrichmentTask>> {
        let mut handles = Vec::new();

        if report.plan.screenshot {
            let task = EnrichmentTask::new(&report.url, EnrichmentKind::Screenshot);
            handles.push(tokio::spawn(screenshot_task(
                task,
                Arc::clone(&self.pipeline),
                Arc::clone(&self.capturer),
                origin.clone(),
            )));
        }

        if let Some(video_id) = &report.plan.transcript_video {
            tracing::debug!(url = %report.url, video_id = %video_id, "scheduling transcript fetch");
            let task = EnrichmentTask::new(&report.url, EnrichmentKind::Transcript);
            handles.push(tokio::spawn(transcript_task(
                task,
                Arc::clone(&self.pipeline),
                Arc::clone(&self.transcripts),
                origin.clone(),
            )));
        }

        handles
    }
}

async fn screenshot_task(
    task: EnrichmentTask,
    pipeline: Arc<IngestPipeline>,
    capturer: Arc<dyn ScreenshotCapturer>,
    origin: OriginContext,
) -> EnrichmentTask {
    if !pipeline.is_recording().await {
        tracing::debug!(url = %task.target_url, "recording stopped, screenshot skipped");
        return task.finish(TaskState::Skipped);
    }

    let (update, state) = match capturer.capture(&origin).await {
        Ok(shot) => (EnrichmentUpdate::ScreenshotCaptured(shot), TaskState::Done),
        Err(e) => {
            tracing::warn!(url = %task.target_url, error = %e, "screenshot failed");
            (EnrichmentUpdate::ScreenshotFailed(e.to_string()), TaskState::Failed)
        }
    };
    merge(task, &pipeline, update, state).await
}

async fn transcript_task(
    task: EnrichmentTask,
    pipeline: Arc<IngestPipeline>,
    transcripts: Arc<dyn TranscriptFetcher>,
    origin: OriginContext,
) -> EnrichmentTask {
    let (update, state) = match transcripts.fetch(&origin, &task.target_url).await {
        Ok(fetched) => (
            EnrichmentUpdate::TranscriptFetched {
                title: fetched.title,
                transcript: fetched.transcript,
            },
            TaskState::Done,
        ),
        Err(e) => {
            tracing::warn!(url = %task.target_url, error = %e, "transcript fetch failed");
            (
                EnrichmentUpdate::TranscriptFailed(format!("Transcript unavailable: {}", e)),
                TaskState::Failed,
            )
        }
    };
    merge(task, &pipeline, update, state).await
}

async fn merge(
    task: EnrichmentTask,
    pipeline: &IngestPipeline,
    update: EnrichmentUpdate,
    state: TaskState,
) -> EnrichmentTask {
    match pipeline.merge_enrichment(&task.target_url, update).await {
        Ok(_) => task.finish(state),
        Err(e) => {
            tracing::warn!(url = %task.target_url, kind = ?task.kind, error = %e, "enrichment not persisted");
            task.finish(TaskState::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::bus::BroadcastBus;
    use crate::session::{PageRecord, SessionPhase, SessionState};
    use crate::storage::MemoryStore;
    use crate::transcript::{Transcript, TranscriptError, UnavailableTranscripts};
    use tokio::sync::Mutex;

    struct FixedCapturer(&'static str);

    #[async_trait]
    impl ScreenshotCapturer for FixedCapturer {
        async fn capture(&self, _origin: &OriginContext) -> Result<ScreenshotRef, CaptureError> {
            Ok(ScreenshotRef::new(self.0))
        }
    }

    struct FixedTranscript;

    #[async_trait]
    impl TranscriptFetcher for FixedTranscript {
        async fn fetch(
            &self,
            _origin: &OriginContext,
            _page_url: &str,
        ) -> Result<Transcript, TranscriptError> {
            Ok(Transcript {
                title: Some("Talk".into()),
                transcript: "hello".into(),
            })
        }
    }

    async fn setup(recording: bool) -> (Arc<IngestPipeline>, Arc<Mutex<SessionState>>) {
        let mut session = SessionState::new();
        session.set_phase(SessionPhase::from_flag(recording));
        let state = Arc::new(Mutex::new(session));
        let pipeline = Arc::new(IngestPipeline::new(
            state.clone(),
            Arc::new(MemoryStore::new()),
            Arc::new(BroadcastBus::new()),
        ));
        (pipeline, state)
    }

    async fn join(handles: Vec<JoinHandle<EnrichmentTask>>) -> Vec<EnrichmentTask> {
        let mut tasks = Vec::new();
        for handle in handles {
            tasks.push(handle.await.unwrap());
        }
        tasks
    }

    #[tokio::test]
    async fn both_tasks_merge_their_fields() {
        let (pipeline, state) = setup(true).await;
        let workers = EnrichmentWorkers::new(
            pipeline.clone(),
            Arc::new(FixedCapturer("shot")),
            Arc::new(FixedTranscript),
        );
        let report = pipeline
            .commit(PageRecord::new("https://v", "V").with_video_id("v"))
            .await
            .unwrap();

        let tasks = join(workers.schedule(&report, &OriginContext::new("tab-1"))).await;

        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.state == TaskState::Done));
        let state = state.lock().await;
        let page = state.find("https://v").unwrap();
        assert_eq!(page.screenshot, Some(ScreenshotRef::new("shot")));
        assert_eq!(page.transcript.as_deref(), Some("hello"));
        assert_eq!(page.video_title.as_deref(), Some("Talk"));
    }

    #[tokio::test]
    async fn screenshot_skipped_once_recording_stops() {
        let (pipeline, state) = setup(true).await;
        let workers = EnrichmentWorkers::new(
            pipeline.clone(),
            Arc::new(FixedCapturer("shot")),
            Arc::new(UnavailableTranscripts),
        );
        let report = pipeline.commit(PageRecord::new("https://a", "A")).await.unwrap();
        state.lock().await.set_phase(SessionPhase::Idle);

        let tasks = join(workers.schedule(&report, &OriginContext::new("tab-1"))).await;

        assert_eq!(tasks[0].kind, EnrichmentKind::Screenshot);
        assert_eq!(tasks[0].state, TaskState::Skipped);
        assert!(state.lock().await.find("https://a").unwrap().screenshot.is_none());
    }

    #[tokio::test]
    async fn transcript_failure_is_recorded_as_description() {
        let (pipeline, state) = setup(true).await;
        let workers = EnrichmentWorkers::new(
            pipeline.clone(),
            Arc::new(UnavailableCapturer),
            Arc::new(UnavailableTranscripts),
        );
        let report = pipeline
            .commit(PageRecord::new("https://v", "Video").with_video_id("xyz"))
            .await
            .unwrap();

        let tasks = join(workers.schedule(&report, &OriginContext::new("tab-1"))).await;

        assert!(tasks.iter().all(|t| t.state == TaskState::Failed));
        let state = state.lock().await;
        let page = state.find("https://v").unwrap();
        assert!(page.transcript.as_deref().unwrap().starts_with("Transcript unavailable:"));
        assert!(page.transcript_failed);
        assert!(page.screenshot.is_none());
        assert_eq!(page.title, "Video");
    }
}
