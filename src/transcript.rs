//! Transcript retrieval for video pages
//!
//! The remote transcript service is only reachable under the originating
//! observer's network identity, so the host executes the request on that
//! context's behalf. `TranscriptFetcher` abstracts over how the request is
//! carried out; `HttpTranscriptFetcher` performs it directly.

use crate::retry::RetryPolicy;
use crate::session::OriginContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A fetched transcript and the video's title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub title: Option<String>,
    pub transcript: String,
}

/// Errors from transcript retrieval.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("network error: {0}")]
    Network(String),
    #[error("transcript service returned status {0}")]
    Status(u16),
    #[error("malformed transcript payload: {0}")]
    Malformed(String),
    #[error("transcript service unavailable: {0}")]
    Unavailable(String),
}

impl TranscriptError {
    /// Transport failures and server-side errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status(code) => *code >= 500,
            Self::Malformed(_) | Self::Unavailable(_) => false,
        }
    }
}

/// Retrieves the transcript for a video page.
///
/// Implementations report every failure as a `TranscriptError`; they never panic.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    async fn fetch(
        &self,
        origin: &OriginContext,
        page_url: &str,
    ) -> Result<Transcript, TranscriptError>;
}

/// Calls a transcript service over HTTP: `GET {endpoint}?url={page_url}`
/// answering `{"title": ..., "transcript": ...}`.
pub struct HttpTranscriptFetcher {
    client: reqwest::Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl HttpTranscriptFetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TranscriptError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranscriptError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            retry: RetryPolicy::none(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, page_url: &str) -> Result<Transcript, TranscriptError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("url", page_url)])
            .send()
            .await
            .map_err(|e| TranscriptError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranscriptError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TranscriptError::Network(e.to_string()))?;
        parse_transcript(&body)
    }
}

#[async_trait]
impl TranscriptFetcher for HttpTranscriptFetcher {
    async fn fetch(
        &self,
        origin: &OriginContext,
        page_url: &str,
    ) -> Result<Transcript, TranscriptError> {
        tracing::debug!(origin = %origin.id, page_url, "fetching transcript");
        self.retry
            .run(|| self.fetch_once(page_url), TranscriptError::is_retryable)
            .await
    }
}

/// Used when no transcript service is configured.
pub struct UnavailableTranscripts;

#[async_trait]
impl TranscriptFetcher for UnavailableTranscripts {
    async fn fetch(
        &self,
        _origin: &OriginContext,
        _page_url: &str,
    ) -> Result<Transcript, TranscriptError> {
        Err(TranscriptError::Unavailable(
            "no transcript endpoint configured".to_string(),
        ))
    }
}

/// Parse a transcript service payload. A blank transcript is malformed.
fn parse_transcript(body: &str) -> Result<Transcript, TranscriptError> {
    let parsed: Transcript =
        serde_json::from_str(body).map_err(|e| TranscriptError::Malformed(e.to_string()))?;
    if parsed.transcript.trim().is_empty() {
        return Err(TranscriptError::Malformed("empty transcript".to_string()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_transcript() {
        let t = parse_transcript(r#"{"title": "Async Rust", "transcript": "hello world"}"#).unwrap();
        assert_eq!(t.title.as_deref(), Some("Async Rust"));
        assert_eq!(t.transcript, "hello world");
    }

    #[test]
    fn title_is_optional() {
        let t = parse_transcript(r#"{"transcript": "hello"}"#).unwrap();
        assert!(t.title.is_none());
    }

    #[test]
    fn missing_transcript_is_malformed() {
        let err = parse_transcript(r#"{"title": "x"}"#).unwrap_err();
        assert!(matches!(err, TranscriptError::Malformed(_)));
    }

    #[test]
    fn blank_transcript_is_malformed() {
        let err = parse_transcript(r#"{"transcript": "  "}"#).unwrap_err();
        assert!(matches!(err, TranscriptError::Malformed(_)));
    }

    #[test]
    fn only_transport_and_server_errors_retry() {
        assert!(TranscriptError::Network("reset".into()).is_retryable());
        assert!(TranscriptError::Status(503).is_retryable());
        assert!(!TranscriptError::Status(404).is_retryable());
        assert!(!TranscriptError::Malformed("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn unavailable_fetcher_always_fails() {
        let origin = OriginContext::new("tab-1");
        let err = UnavailableTranscripts
            .fetch(&origin, "https://www.youtube.com/watch?v=xyz")
            .await
            .unwrap_err();
        assert!(matches!(err, TranscriptError::Unavailable(_)));
    }
}
