//! Quiz payload parsing
//!
//! The model is asked for a strict JSON array, but often wraps it in prose
//! or code fences. Parsing tries, in order:
//! 1. Direct parse (response is the array)
//! 2. A ```json ... ``` or ``` ... ``` fenced block
//! 3. The first `[` to last `]` span
//! 4. An object wrapping the array under `questions` or `quiz`

use super::LlmError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// Parse a quiz response, recovering the array from surrounding text if needed.
pub fn parse_quiz(text: &str) -> Result<Vec<QuizItem>, LlmError> {
    let array = extract_array(text).ok_or_else(|| {
        LlmError::MalformedResponse("no JSON array of quiz items found".to_string())
    })?;

    let items: Vec<QuizItem> = serde_json::from_value(array)
        .map_err(|e| LlmError::MalformedResponse(format!("quiz items: {}", e)))?;

    if items.is_empty() {
        return Err(LlmError::MalformedResponse("empty quiz".to_string()));
    }
    Ok(items)
}

fn extract_array(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    // Try 1: Direct parse
    if let Some(v) = parse_candidate(trimmed) {
        return Some(v);
    }

    // Try 2: Fenced code block
    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };
    if let Some(v) = fenced.and_then(|block| parse_candidate(block.trim())) {
        return Some(v);
    }

    // Try 3: First [ to last ]
    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            if let Some(v) = parse_candidate(&trimmed[start..=end]) {
                return Some(v);
            }
        }
    }

    // Try 4: First { to last }, looking for a wrapped array
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return parse_candidate(&trimmed[start..=end]);
        }
    }

    None
}

/// Accept an array, or an object carrying the array under a known key.
fn parse_candidate(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text).ok()? {
        v @ Value::Array(_) => Some(v),
        Value::Object(mut map) => ["questions", "quiz"]
            .iter()
            .find_map(|key| map.remove(*key).filter(Value::is_array)),
        _ => None,
    }
}
