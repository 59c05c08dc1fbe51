//! Page records: the payload observers send, and the entry the session keeps per URL

use super::error::{SessionError, SessionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A heading extracted from a page (`level` is 1..=6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

impl Heading {
    pub fn new(level: u8, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// Reference to a captured image of the originating context.
///
/// Serializes as a plain string (usually a `data:image/png;base64,...` URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenshotRef(String);

impl ScreenshotRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The observer context (one rendered page) a message came from.
///
/// Screenshots are taken of this context, and transcript fetches run
/// under its network identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginContext {
    /// Host-assigned identifier (a tab id, a socket id, ...)
    pub id: String,
    /// URL currently loaded in that context, if the host knows it
    #[serde(default)]
    pub url: Option<String>,
}

impl OriginContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// One structured extraction of a rendered page, as reported by an observer.
///
/// Unknown fields sent by observers (e.g. `mainContent`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default)]
    pub code_blocks: Vec<String>,
    #[serde(default)]
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub list_items: Vec<String>,
    #[serde(default)]
    pub video_id: Option<String>,
}

impl PageRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_heading(mut self, level: u8, text: impl Into<String>) -> Self {
        self.headings.push(Heading::new(level, text));
        self
    }

    pub fn with_code_block(mut self, code: impl Into<String>) -> Self {
        self.code_blocks.push(code.into());
        self
    }

    pub fn with_paragraph(mut self, text: impl Into<String>) -> Self {
        self.paragraphs.push(text.into());
        self
    }

    pub fn with_list_item(mut self, text: impl Into<String>) -> Self {
        self.list_items.push(text.into());
        self
    }

    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    /// Reject records that cannot be keyed or carry impossible heading levels.
    pub fn validate(&self) -> SessionResult<()> {
        if self.url.trim().is_empty() {
            return Err(SessionError::MissingField("url"));
        }
        if let Some(bad) = self.headings.iter().find(|h| !(1..=6).contains(&h.level)) {
            return Err(SessionError::InvalidRecord(format!(
                "heading level {} out of range 1..=6",
                bad.level
            )));
        }
        Ok(())
    }

    /// SHA-256 over the content fields, byte for byte.
    ///
    /// Every field is tagged and length-prefixed, so moving a string from one
    /// field to another changes the hash. Whitespace is significant: an
    /// indentation change in a code block is new content.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut feed = |tag: &str, value: &str| {
            hasher.update(tag.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        };

        feed("url", &self.url);
        feed("title", &self.title);
        for h in &self.headings {
            feed("h", &format!("{}:{}", h.level, h.text));
        }
        for code in &self.code_blocks {
            feed("code", code);
        }
        for p in &self.paragraphs {
            feed("p", p);
        }
        for item in &self.list_items {
            feed("li", item);
        }
        feed("video", self.video_id.as_deref().unwrap_or(""));

        format!("{:x}", hasher.finalize())
    }
}

/// A single enrichment result to be merged into a captured page.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentUpdate {
    ScreenshotCaptured(ScreenshotRef),
    ScreenshotFailed(String),
    TranscriptFetched {
        title: Option<String>,
        transcript: String,
    },
    TranscriptFailed(String),
}

/// The session's canonical entry for one URL.
///
/// Content fields reflect the latest observation; enrichment fields
/// (`screenshot`, `transcript`, `video_title`) hold the best value known so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default)]
    pub code_blocks: Vec<String>,
    #[serde(default)]
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub list_items: Vec<String>,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    /// True while `transcript` holds a failure description rather than a transcript
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub transcript_failed: bool,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub screenshot: Option<ScreenshotRef>,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CapturedPage {
    /// Create an entry from a first observation; enrichment fields start unset.
    pub fn from_record(record: PageRecord, now: DateTime<Utc>) -> Self {
        let fingerprint = record.fingerprint();
        Self {
            url: record.url,
            title: record.title,
            headings: record.headings,
            code_blocks: record.code_blocks,
            paragraphs: record.paragraphs,
            list_items: record.list_items,
            video_id: record.video_id,
            transcript: None,
            transcript_failed: false,
            video_title: None,
            screenshot: None,
            fingerprint,
            captured_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Replace every content field with the newer observation.
    ///
    /// Enrichment fields are not touched.
    pub fn replace_content(&mut self, record: PageRecord, now: DateTime<Utc>) {
        self.fingerprint = record.fingerprint();
        self.title = record.title;
        self.headings = record.headings;
        self.code_blocks = record.code_blocks;
        self.paragraphs = record.paragraphs;
        self.list_items = record.list_items;
        self.video_id = record.video_id;
        self.updated_at = Some(now);
    }

    /// Merge one enrichment result. Returns true if the page changed.
    ///
    /// A failure only ever fills an empty field; it never clears or
    /// replaces a value that came from a successful attempt.
    pub fn apply_enrichment(&mut self, update: EnrichmentUpdate) -> bool {
        match update {
            EnrichmentUpdate::ScreenshotCaptured(shot) => {
                if self.screenshot.as_ref() == Some(&shot) {
                    return false;
                }
                self.screenshot = Some(shot);
                true
            }
            EnrichmentUpdate::ScreenshotFailed(_) => false,
            EnrichmentUpdate::TranscriptFetched { title, transcript } => {
                let title = title.or_else(|| self.video_title.clone());
                if !self.transcript_failed
                    && self.transcript.as_deref() == Some(transcript.as_str())
                    && self.video_title == title
                {
                    return false;
                }
                self.transcript = Some(transcript);
                self.transcript_failed = false;
                self.video_title = title;
                true
            }
            EnrichmentUpdate::TranscriptFailed(message) => {
                if self.transcript.is_some() {
                    return false;
                }
                self.transcript = Some(message);
                self.transcript_failed = true;
                true
            }
        }
    }

    pub fn needs_screenshot(&self) -> bool {
        self.screenshot.is_none()
    }

    /// The video id still lacking a successful transcript, if any.
    pub fn pending_transcript(&self) -> Option<&str> {
        match (&self.video_id, &self.transcript) {
            (Some(id), None) => Some(id),
            (Some(id), Some(_)) if self.transcript_failed => Some(id),
            _ => None,
        }
    }
}

impl From<PageRecord> for CapturedPage {
    fn from(record: PageRecord) -> Self {
        Self::from_record(record, Utc::now())
    }
}
