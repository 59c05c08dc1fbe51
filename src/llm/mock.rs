//! Mock note generator for tests

use super::quiz::{parse_quiz, QuizItem};
use super::{LlmError, NoteGenerator};
use crate::session::CapturedPage;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Mock generator for testing: returns preconfigured responses and records
/// what it was asked.
///
/// Quiz responses are raw model text and go through the same parsing as the
/// HTTP generator.
pub struct MockGenerator {
    configured: bool,
    summary: Result<String, String>,
    quiz: Result<String, String>,
    delay: Option<Duration>,
    summarized: Mutex<Vec<Vec<String>>>,
    quizzed: Mutex<Vec<(String, usize)>>,
}

impl MockGenerator {
    /// A generator with credentials that answers every request successfully.
    pub fn new() -> Self {
        Self {
            configured: true,
            summary: Ok("# Notes".to_string()),
            quiz: Ok(r#"[{"question":"Q1","answer":"A1","explanation":"E1"}]"#.to_string()),
            delay: None,
            summarized: Mutex::new(Vec::new()),
            quizzed: Mutex::new(Vec::new()),
        }
    }

    /// A generator with no credentials configured.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    pub fn with_summary(mut self, text: impl Into<String>) -> Self {
        self.summary = Ok(text.into());
        self
    }

    /// Fail summarization with a provider error carrying `message`.
    pub fn with_summary_failure(mut self, message: impl Into<String>) -> Self {
        self.summary = Err(message.into());
        self
    }

    pub fn with_quiz(mut self, raw: impl Into<String>) -> Self {
        self.quiz = Ok(raw.into());
        self
    }

    pub fn with_quiz_failure(mut self, message: impl Into<String>) -> Self {
        self.quiz = Err(message.into());
        self
    }

    /// Sleep before answering, to hold a request in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs of the pages passed to each `summarize` call.
    pub fn summarized(&self) -> Vec<Vec<String>> {
        self.summarized.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Content and count of each `quiz` call.
    pub fn quizzed(&self) -> Vec<(String, usize)> {
        self.quizzed.lock().map(|q| q.clone()).unwrap_or_default()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NoteGenerator for MockGenerator {
    async fn summarize(&self, pages: &[CapturedPage]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.summarized.lock() {
            calls.push(pages.iter().map(|p| p.url.clone()).collect());
        }
        self.pause().await;

        if !self.configured {
            return Err(LlmError::MissingCredential);
        }
        self.summary.clone().map_err(LlmError::Api)
    }

    async fn quiz(&self, content: &str, count: usize) -> Result<Vec<QuizItem>, LlmError> {
        if let Ok(mut calls) = self.quizzed.lock() {
            calls.push((content.to_string(), count));
        }
        self.pause().await;

        if !self.configured {
            return Err(LlmError::MissingCredential);
        }
        match &self.quiz {
            Ok(raw) => parse_quiz(raw),
            Err(message) => Err(LlmError::Api(message.clone())),
        }
    }
}
