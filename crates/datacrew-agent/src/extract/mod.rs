//! Turning free-form model output into structured records.
//!
//! A fenced ```json object wins when present. Otherwise role-specific markers
//! are scraped: `name: number` metrics, bullet lists, a quality score and
//! verdict keywords. When nothing usable is found the caller decides, through
//! [`ExtractionPolicy`], whether to fail or to store [`fallback_record`].

use datacrew_core::ExtractionPolicy;
use datacrew_tooling::extract_code_blocks;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Marker scrapers.
pub mod markers;
/// Routing marker parsing.
pub mod routing;

pub use routing::parse_routing;

/// Longest excerpt of the raw output kept in a fallback record.
const EXCERPT_CHARS: usize = 400;

/// Why a record could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// Neither a JSON object nor any recognised marker was found
    #[error("no structured content found in model output")]
    NoStructure,

    /// A JSON block was present but could not be parsed into an object
    #[error("invalid JSON block: {0}")]
    InvalidJson(String),
}

/// Which markers to look for when no JSON block is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeKind {
    /// Bullet list of goals and success criteria
    Goals,
    /// Metrics plus an optional quality score
    Profile,
    /// Bullet list of preparation steps
    Steps,
    /// Bullet list of derived features
    Features,
    /// Model metrics
    Metrics,
    /// Approve/reject verdict with optional reason
    Verdict,
    /// Recommendations plus a summary paragraph
    Recommendation,
}

/// Extracts a structured record from `text`.
///
/// # Errors
/// Returns [`ExtractError::InvalidJson`] when the only structure present is a
/// malformed JSON block, [`ExtractError::NoStructure`] when nothing is found.
pub fn extract_record(text: &str, kind: ScrapeKind) -> Result<Value, ExtractError> {
    let json_error = match json_object(text) {
        Ok(Some(mut record)) => {
            if kind == ScrapeKind::Verdict {
                markers::normalize_verdict(&mut record);
            }
            return Ok(Value::Object(record));
        }
        Ok(None) => None,
        Err(error) => Some(error),
    };

    match scrape(text, kind) {
        Some(record) => Ok(Value::Object(record)),
        None => Err(json_error.unwrap_or(ExtractError::NoStructure)),
    }
}

/// First fenced JSON object in `text`.
fn json_object(text: &str) -> Result<Option<Map<String, Value>>, ExtractError> {
    let Some(block) = extract_code_blocks(text).into_iter().find(|block| block.is_json()) else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(&block.code) {
        Ok(Value::Object(record)) => Ok(Some(record)),
        Ok(other) => Err(ExtractError::InvalidJson(format!(
            "expected an object, found {}",
            json_kind(&other)
        ))),
        Err(error) => Err(ExtractError::InvalidJson(error.to_string())),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scrape(text: &str, kind: ScrapeKind) -> Option<Map<String, Value>> {
    let mut record = Map::new();
    match kind {
        ScrapeKind::Goals => insert_list(&mut record, "goals", markers::bullets(text)),
        ScrapeKind::Steps => insert_list(&mut record, "steps", markers::bullets(text)),
        ScrapeKind::Features => insert_list(&mut record, "features", markers::bullets(text)),
        ScrapeKind::Metrics => insert_metrics(&mut record, text),
        ScrapeKind::Profile => {
            insert_metrics(&mut record, text);
            if let Some(score) = markers::quality_score(text) {
                record.insert("quality_score".to_owned(), json!(score));
            }
        }
        ScrapeKind::Verdict => {
            if let Some(verdict) = markers::verdict(text) {
                record.insert("approved".to_owned(), Value::Bool(verdict.approved));
                if let Some(reason) = verdict.reason {
                    record.insert("reason".to_owned(), Value::String(reason));
                }
            }
            insert_metrics(&mut record, text);
        }
        ScrapeKind::Recommendation => {
            insert_list(&mut record, "recommendations", markers::bullets(text));
            if !record.is_empty()
                && let Some(summary) = markers::first_paragraph(text)
            {
                record.insert("summary".to_owned(), Value::String(summary));
            }
        }
    }
    (!record.is_empty()).then_some(record)
}

fn insert_list(record: &mut Map<String, Value>, key: &str, items: Vec<String>) {
    if !items.is_empty() {
        record.insert(key.to_owned(), json!(items));
    }
}

fn insert_metrics(record: &mut Map<String, Value>, text: &str) {
    let metrics = markers::metrics(text);
    if !metrics.is_empty() {
        record.insert("metrics".to_owned(), Value::Object(metrics));
    }
}

/// Conservative record stored when extraction misses under [`ExtractionPolicy::Degrade`].
///
/// Carries the reason and an excerpt of the raw output, never invented values.
pub fn fallback_record(text: &str, error: &ExtractError) -> Value {
    let excerpt: String = text.trim().chars().take(EXCERPT_CHARS).collect();
    json!({
        "fallback": true,
        "reason": error.to_string(),
        "excerpt": excerpt,
    })
}

/// Whether a stored record is a fallback record.
pub fn is_fallback(value: &Value) -> bool {
    value.get("fallback").and_then(Value::as_bool) == Some(true)
}

/// Applies `policy` to an extraction outcome.
///
/// # Errors
/// Returns the extraction error unchanged under [`ExtractionPolicy::Fail`].
pub fn apply_policy(
    outcome: Result<Value, ExtractError>,
    text: &str,
    policy: ExtractionPolicy,
) -> Result<Value, ExtractError> {
    match (outcome, policy) {
        (Ok(value), _) => Ok(value),
        (Err(error), ExtractionPolicy::Degrade) => Ok(fallback_record(text, &error)),
        (Err(error), ExtractionPolicy::Fail) => Err(error),
    }
}
