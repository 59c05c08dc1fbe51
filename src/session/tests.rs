//! SessionState behaviour and persisted-schema fixtures

use super::*;
use crate::storage::{MemoryStore, SessionStore, StoreKey};
use chrono::Utc;
use serde_json::json;

fn record(url: &str, title: &str) -> PageRecord {
    PageRecord::new(url, title).with_paragraph(format!("body of {}", title))
}

/// Fixture: a record set as observers and UI surfaces read it from the store
fn stored_records_fixture() -> serde_json::Value {
    json!([
        {
            "url": "https://docs.rs/tokio",
            "title": "tokio",
            "headings": [{"level": 1, "text": "Crate tokio"}],
            "codeBlocks": [],
            "paragraphs": ["A runtime for writing reliable network applications."],
            "listItems": [],
            "videoId": null,
            "screenshot": "data:image/png;base64,AAAA"
        },
        {
            "url": "https://www.youtube.com/watch?v=xyz",
            "title": "Async Rust",
            "videoId": "xyz",
            "transcript": "Transcript unavailable: offline",
            "transcriptFailed": true
        }
    ])
}

#[test]
fn same_url_keeps_one_entry_with_latest_content() {
    let mut state = SessionState::new();
    let now = Utc::now();

    assert_eq!(state.upsert(record("https://a", "A"), now), UpsertOutcome::Inserted);
    assert_eq!(state.upsert(record("https://a", "A2"), now), UpsertOutcome::Updated);
    assert_eq!(state.upsert(record("https://a", "A3"), now), UpsertOutcome::Updated);

    assert_eq!(state.records().len(), 1);
    assert_eq!(state.records()[0].title, "A3");
}

#[test]
fn identical_content_is_unchanged() {
    let mut state = SessionState::new();
    let now = Utc::now();
    state.upsert(record("https://a", "A"), now);
    assert_eq!(state.upsert(record("https://a", "A"), now), UpsertOutcome::Unchanged);
}

#[test]
fn url_match_is_case_sensitive() {
    let mut state = SessionState::new();
    let now = Utc::now();
    state.upsert(record("https://a/Page", "A"), now);
    state.upsert(record("https://a/page", "a"), now);
    assert_eq!(state.records().len(), 2);
}

#[test]
fn insertion_order_is_preserved_across_updates() {
    let mut state = SessionState::new();
    let now = Utc::now();
    state.upsert(record("https://a", "A"), now);
    state.upsert(record("https://b", "B"), now);
    state.upsert(record("https://a", "A2"), now);

    let urls: Vec<&str> = state.records().iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a", "https://b"]);
}

#[test]
fn remove_is_idempotent() {
    let mut state = SessionState::new();
    state.upsert(record("https://a", "A"), Utc::now());

    assert!(state.remove("https://a"));
    let after_first = state.snapshot();
    assert!(!state.remove("https://a"));
    assert_eq!(state.snapshot(), after_first);
}

#[test]
fn clear_drops_records_and_summary() {
    let mut state = SessionState::new();
    let now = Utc::now();
    state.upsert(record("https://a", "A"), now);
    state.upsert(record("https://b", "B"), now);
    state.set_summary("notes".into(), vec!["https://a".into()]);

    assert_eq!(state.clear(), 2);
    assert!(state.records().is_empty());
    assert!(state.summary().is_none());
    assert!(state.summary_sources().is_none());
}

#[test]
fn enrichment_for_missing_url_is_stale() {
    let mut state = SessionState::new();
    let update = EnrichmentUpdate::ScreenshotCaptured(ScreenshotRef::new("S"));
    assert_eq!(state.apply_enrichment("https://gone", update), None);
}

#[test]
fn load_reads_persisted_schema() {
    let store = MemoryStore::new();
    store
        .put_many(&[
            (StoreKey::Recording, json!(true)),
            (StoreKey::Records, stored_records_fixture()),
            (StoreKey::Summary, json!("# Notes")),
            (StoreKey::SummarySources, json!(["https://docs.rs/tokio"])),
        ])
        .unwrap();

    let state = SessionState::load(&store).unwrap();
    assert_eq!(state.phase(), SessionPhase::Recording);
    assert_eq!(state.records().len(), 2);
    assert_eq!(
        state.records()[0].screenshot.as_ref().map(|s| s.as_str()),
        Some("data:image/png;base64,AAAA")
    );
    assert!(state.records()[1].transcript_failed);
    assert_eq!(state.summary(), Some("# Notes"));
    assert_eq!(state.summary_sources().unwrap().len(), 1);
}

#[test]
fn load_defaults_when_store_is_empty() {
    let state = SessionState::load(&MemoryStore::new()).unwrap();
    assert_eq!(state.phase(), SessionPhase::Idle);
    assert!(state.records().is_empty());
    assert!(state.summary().is_none());
}

#[test]
fn load_collapses_duplicate_urls() {
    let store = MemoryStore::new();
    store
        .put(
            StoreKey::Records,
            json!([
                {"url": "https://a", "title": "old"},
                {"url": "https://b", "title": "B"},
                {"url": "https://a", "title": "new"}
            ]),
        )
        .unwrap();

    let state = SessionState::load(&store).unwrap();
    assert_eq!(state.records().len(), 2);
    assert_eq!(state.find("https://a").unwrap().title, "new");
}

#[test]
fn snapshot_serializes_camel_case() {
    let mut state = SessionState::new();
    state.set_summary("n".into(), vec!["https://a".into()]);
    let value = serde_json::to_value(state.snapshot()).unwrap();
    assert_eq!(value["recording"], json!(false));
    assert_eq!(value["summarySources"], json!(["https://a"]));
}
