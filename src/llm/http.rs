//! HTTP note generator for the OpenAI and Anthropic APIs

use super::prompt::{quiz_prompt, summary_prompt, QUIZ_SYSTEM, SUMMARY_SYSTEM};
use super::quiz::{parse_quiz, QuizItem};
use super::{LlmError, NoteGenerator};
use crate::config::CoordinatorConfig;
use crate::retry::RetryPolicy;
use crate::session::CapturedPage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 12000;

/// Remote text-generation provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn label(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Pick the provider to call: the preferred one when its key is set,
    /// otherwise OpenAI, then Anthropic.
    pub fn resolve<'a>(
        preferred: Option<Provider>,
        openai_key: Option<&'a str>,
        anthropic_key: Option<&'a str>,
    ) -> Option<(Provider, &'a str)> {
        let raw_key = |provider: Provider| match provider {
            Provider::OpenAi => openai_key,
            Provider::Anthropic => anthropic_key,
        };
        let key_for = |provider: Provider| raw_key(provider).filter(|k| !k.trim().is_empty());

        if let Some(provider) = preferred {
            if let Some(key) = key_for(provider) {
                return Some((provider, key));
            }
        }
        [Provider::OpenAi, Provider::Anthropic]
            .into_iter()
            .find_map(|provider| key_for(provider).map(|key| (provider, key)))
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Calls the configured provider over HTTPS.
///
/// Credentials are checked on every call, so a generator built without keys
/// still answers each request with `LlmError::MissingCredential`.
pub struct HttpNoteGenerator {
    client: reqwest::Client,
    openai_key: Option<String>,
    anthropic_key: Option<String>,
    preferred: Option<Provider>,
    openai_model: String,
    anthropic_model: String,
    paragraph_limit: usize,
    retry: RetryPolicy,
}

impl HttpNoteGenerator {
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            client,
            openai_key: config.openai_api_key.clone(),
            anthropic_key: config.anthropic_api_key.clone(),
            preferred: config.preferred_provider,
            openai_model: config.openai_model.clone(),
            anthropic_model: config.anthropic_model.clone(),
            paragraph_limit: config.summary_paragraph_limit,
            retry: config.retry_policy(),
        })
    }

    fn provider(&self) -> Result<(Provider, &str), LlmError> {
        Provider::resolve(
            self.preferred,
            self.openai_key.as_deref(),
            self.anthropic_key.as_deref(),
        )
        .ok_or(LlmError::MissingCredential)
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let (provider, key) = self.provider()?;
        tracing::info!(provider = provider.label(), prompt_chars = prompt.len(), "requesting completion");

        let result = self
            .retry
            .run(
                || self.complete_once(provider, key, system, prompt),
                LlmError::is_retryable,
            )
            .await;
        if let Err(e) = &result {
            tracing::warn!(provider = provider.label(), error = %e, "completion failed");
        }
        result
    }

    async fn complete_once(
        &self,
        provider: Provider,
        key: &str,
        system: &str,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let request = match provider {
            Provider::OpenAi => self.client.post(OPENAI_URL).bearer_auth(key).json(&json!({
                "model": self.openai_model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt}
                ],
                "temperature": TEMPERATURE,
                "max_tokens": MAX_TOKENS
            })),
            Provider::Anthropic => self
                .client
                .post(ANTHROPIC_URL)
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.anthropic_model,
                    "system": system,
                    "messages": [
                        {"role": "user", "content": prompt}
                    ],
                    "temperature": TEMPERATURE,
                    "max_tokens": MAX_TOKENS
                })),
        };

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        interpret_response(provider, status, &body)
    }
}

/// Turn a provider reply into completion text or the matching error.
fn interpret_response(provider: Provider, status: u16, body: &str) -> Result<String, LlmError> {
    if status == 429 || status >= 500 {
        return Err(LlmError::Status(status));
    }

    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(_) if !(200..300).contains(&status) => return Err(LlmError::Status(status)),
        Err(e) => return Err(LlmError::MalformedResponse(e.to_string())),
    };

    if let Some(message) = api_error_message(&json) {
        return Err(LlmError::Api(message));
    }
    if !(200..300).contains(&status) {
        return Err(LlmError::Status(status));
    }

    let text = match provider {
        Provider::OpenAi => extract_openai_text(&json),
        Provider::Anthropic => extract_anthropic_text(&json),
    };
    text.ok_or_else(|| {
        LlmError::MalformedResponse(format!("{} response missing text content", provider))
    })
}

fn api_error_message(json: &Value) -> Option<String> {
    let error = json.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

fn extract_openai_text(json: &Value) -> Option<String> {
    let first = json.get("choices")?.as_array()?.first()?;
    first
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    let content = json.get("content").and_then(Value::as_array)?;
    let chunks: Vec<&str> = content
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

#[async_trait]
impl NoteGenerator for HttpNoteGenerator {
    async fn summarize(&self, pages: &[CapturedPage]) -> Result<String, LlmError> {
        let prompt = summary_prompt(pages, self.paragraph_limit);
        self.complete(SUMMARY_SYSTEM, &prompt).await
    }

    async fn quiz(&self, content: &str, count: usize) -> Result<Vec<QuizItem>, LlmError> {
        let prompt = quiz_prompt(content, count);
        let text = self.complete(QUIZ_SYSTEM, &prompt).await?;
        parse_quiz(&text)
    }
}
