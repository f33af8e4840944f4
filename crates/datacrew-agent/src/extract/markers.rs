use regex::Regex;
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Compiles a built-in pattern.
fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("Marker regex {pattern} is invalid: {err}"),
    }
}

/// Fenced blocks, removed before scraping prose.
static FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)```.*?(?:```|\z)"));

/// `name: number` or `name = number`, one per line, optionally bulleted.
static METRIC_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?m)^[ \t]*(?:[-*•][ \t]+)?([A-Za-z][A-Za-z0-9 _/()%-]{0,48}?)[ \t]*[:=][ \t]*(-?\d+(?:\.\d+)?)")
});

/// Bulleted or numbered list item.
static BULLET_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?m)^[ \t]*(?:[-*•]|\d+[.)])[ \t]+(.+?)[ \t]*$"));

static QUALITY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)quality[ _]score[^0-9\n]{0,20}(\d+(?:\.\d+)?)"));

static VERDICT_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)verdict[ \t]*[:=][ \t]*\**[ \t]*(approved|rejected)"));

static VERDICT_WORD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(APPROVED|REJECTED)\b"));

static REASON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?im)^[ \t]*reason[ \t]*:[ \t]*(.+?)[ \t]*$"));

/// Approve/reject decision found in an evaluator's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the model was approved
    pub approved: bool,
    /// Reason line, when given
    pub reason: Option<String>,
}

fn prose(text: &str) -> Cow<'_, str> {
    FENCE_REGEX.replace_all(text, "")
}

/// Lower-cases and joins words with underscores.
fn metric_key(name: &str) -> String {
    name.split(|character: char| !character.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// `name: number` pairs outside code fences. The first occurrence of a name wins.
pub fn metrics(text: &str) -> Map<String, Value> {
    let mut found = Map::new();
    for caps in METRIC_REGEX.captures_iter(&prose(text)) {
        let (Some(name), Some(number)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let key = metric_key(name.as_str());
        if key.is_empty() || found.contains_key(&key) {
            continue;
        }
        if let Some(value) = number
            .as_str()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
        {
            found.insert(key, Value::Number(value));
        }
    }
    found
}

/// List items outside code fences.
pub fn bullets(text: &str) -> Vec<String> {
    BULLET_REGEX
        .captures_iter(&prose(text))
        .filter_map(|caps| caps.get(1))
        .map(|item| item.as_str().to_owned())
        .filter(|item| !item.starts_with("ROUTE:"))
        .collect()
}

/// Data quality score, if stated.
pub fn quality_score(text: &str) -> Option<f64> {
    QUALITY_REGEX
        .captures(&prose(text))?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Evaluator verdict: an explicit `VERDICT:` line first, then a bare upper-case keyword.
pub fn verdict(text: &str) -> Option<Verdict> {
    let body = prose(text);
    let keyword = VERDICT_LINE_REGEX
        .captures(&body)
        .or_else(|| VERDICT_WORD_REGEX.captures(&body))?
        .get(1)?
        .as_str()
        .to_ascii_lowercase();
    let reason = REASON_REGEX
        .captures(&body)
        .and_then(|caps| caps.get(1))
        .map(|reason| reason.as_str().to_owned());
    Some(Verdict {
        approved: keyword == "approved",
        reason,
    })
}

/// Makes a JSON verdict record carry a boolean `approved` field.
///
/// Accepts `"approved": true`, `"verdict": "approved"` and `"status": "rejected"` forms.
pub fn normalize_verdict(record: &mut Map<String, Value>) {
    if record.get("approved").is_some_and(Value::is_boolean) {
        return;
    }
    let stated = ["verdict", "status", "decision"]
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::to_ascii_lowercase);
    match stated.as_deref() {
        Some("approved" | "approve" | "accept" | "accepted" | "pass") => {
            record.insert("approved".to_owned(), Value::Bool(true));
        }
        Some("rejected" | "reject" | "fail" | "failed") => {
            record.insert("approved".to_owned(), Value::Bool(false));
        }
        _ => {}
    }
}

/// First paragraph that is not a list, heading or routing marker.
pub fn first_paragraph(text: &str) -> Option<String> {
    prose(text)
        .split("\n\n")
        .map(str::trim)
        .find(|paragraph| {
            !paragraph.is_empty()
                && !paragraph.starts_with('#')
                && !paragraph.starts_with("ROUTE:")
                && !BULLET_REGEX.is_match(paragraph)
        })
        .map(|paragraph| paragraph.lines().map(str::trim).collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metrics_ignore_code() {
        let text = "```python\nscore = 0.5\n```\nRMSE: 1.25\nR2 = -0.1";
        let found = metrics(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found["rmse"], json!(1.25));
        assert_eq!(found["r2"], json!(-0.1));
    }

    #[test]
    fn test_first_metric_occurrence_wins() {
        let found = metrics("accuracy: 0.8\naccuracy: 0.9");
        assert_eq!(found["accuracy"], json!(0.8));
    }

    #[test]
    fn test_bullets() {
        let text = "Steps:\n- drop duplicates\n* impute age with median\n2) scale numeric columns\nROUTE: COMPLETE";
        assert_eq!(
            bullets(text),
            vec![
                "drop duplicates",
                "impute age with median",
                "scale numeric columns"
            ]
        );
    }

    #[test]
    fn test_verdict_line_beats_keyword() {
        let text = "Previously REJECTED twice.\nVERDICT: approved\nReason: meets recall target";
        let found = verdict(text).unwrap();
        assert!(found.approved);
        assert_eq!(found.reason.as_deref(), Some("meets recall target"));
    }

    #[test]
    fn test_lowercase_prose_is_not_a_verdict() {
        assert_eq!(verdict("I approved of the approach, not rejected it."), None);
    }

    #[test]
    fn test_bare_keyword_verdict() {
        let found = verdict("REJECTED - the model overfits.").unwrap();
        assert!(!found.approved);
        assert_eq!(found.reason, None);
    }

    #[test]
    fn test_first_paragraph_skips_headings_and_lists() {
        let text = "# Recommendation\n\n- ship it\n\nThe churn model\ncan go live.\n\nMore.";
        assert_eq!(
            first_paragraph(text).as_deref(),
            Some("The churn model can go live.")
        );
    }

    #[test]
    fn test_normalize_verdict_keeps_boolean() {
        let mut record = json!({"approved": false, "verdict": "approved"})
            .as_object()
            .cloned()
            .unwrap();
        normalize_verdict(&mut record);
        assert_eq!(record["approved"], json!(false));
    }
}
