use datacrew_core::{Outcome, ResultSlot, SessionId, SharedState, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

use crate::extract::is_fallback;

/// Longest rendering of one slot in the narrative summary.
const SLOT_SUMMARY_CHARS: usize = 240;

/// What a workflow run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    /// Session of the run
    pub session_id: SessionId,
    /// True only when every required task completed and the run ended normally
    pub success: bool,
    /// Terminal reason
    pub outcome: Outcome,
    /// Narrative assembled from the populated result slots
    pub summary: String,
    /// Tasks completed during the run
    pub completed_tasks: Vec<TaskId>,
    /// Required tasks still open at termination
    pub remaining_tasks: Vec<TaskId>,
    /// Files written to the session workspace
    pub artifacts: Vec<String>,
    /// Controller cycles executed
    pub iterations: u32,
    /// Final state, for introspection
    pub state: SharedState,
}

impl FinalReport {
    /// Builds the report for a finished run.
    pub fn new(state: SharedState, outcome: Outcome, required: &[TaskId]) -> Self {
        let remaining_tasks: Vec<TaskId> = required
            .iter()
            .filter(|task| !state.is_completed(task))
            .cloned()
            .collect();
        let success = remaining_tasks.is_empty() && !outcome.is_abnormal();
        let summary = narrative(&state, &outcome, required.len(), remaining_tasks.len());

        Self {
            session_id: state.session_id(),
            success,
            outcome,
            summary,
            completed_tasks: state.completed_tasks().iter().cloned().collect(),
            remaining_tasks,
            artifacts: state.artifacts().to_vec(),
            iterations: state.iteration_count(),
            state,
        }
    }

    /// Renders the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let status = if self.success { "succeeded" } else { "did not succeed" };
        let _ignored = writeln!(out, "# Datacrew report\n");
        let _ignored = writeln!(out, "- Session: `{}`", self.session_id);
        let _ignored = writeln!(out, "- Request: {}", self.state.request());
        let _ignored = writeln!(out, "- Dataset: `{}`", self.state.dataset());
        let _ignored = writeln!(out, "- Result: run {status} ({})", self.outcome);
        let _ignored = writeln!(out, "- Iterations: {}\n", self.iterations);

        let _ignored = writeln!(out, "## Summary\n\n{}\n", self.summary);

        let _ignored = writeln!(out, "## Tasks\n");
        for task in &self.completed_tasks {
            let _ignored = writeln!(out, "- [x] {task}");
        }
        for task in &self.remaining_tasks {
            let _ignored = writeln!(out, "- [ ] {task}");
        }
        out.push('\n');

        for slot in ResultSlot::ALL {
            let Some(value) = self.state.result(slot) else {
                continue;
            };
            let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            let _ignored = writeln!(out, "## {}\n\n```json\n{body}\n```\n", slot.title());
        }

        if !self.artifacts.is_empty() {
            let _ignored = writeln!(out, "## Artifacts\n");
            for artifact in &self.artifacts {
                let _ignored = writeln!(out, "- `{artifact}`");
            }
            out.push('\n');
        }

        let errors = self.state.errors();
        if !errors.is_empty() {
            let _ignored = writeln!(out, "## Errors\n");
            for error in errors {
                let _ignored = writeln!(out, "- {error}");
            }
        }
        out
    }
}

fn narrative(state: &SharedState, outcome: &Outcome, required: usize, remaining: usize) -> String {
    let mut lines = vec![format!(
        "Run {outcome} after {} iterations; {} of {required} required tasks completed.",
        state.iteration_count(),
        required - remaining,
    )];
    for slot in ResultSlot::ALL {
        if let Some(value) = state.result(slot) {
            lines.push(format!("{}: {}", slot.title(), describe(value)));
        }
    }
    lines.join("\n")
}

/// One-line rendering of a slot record.
fn describe(value: &Value) -> String {
    if is_fallback(value) {
        return "no structured result (fallback record)".to_owned();
    }
    let text = match value {
        Value::Object(fields) => {
            if let Some(summary) = fields.get("summary").and_then(Value::as_str) {
                summary.to_owned()
            } else {
                fields
                    .iter()
                    .map(|(key, field)| format!("{key}: {}", inline(field)))
                    .collect::<Vec<_>>()
                    .join("; ")
            }
        }
        other => inline(other),
    };
    truncate(&text)
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(inline).collect::<Vec<_>>().join(", "),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, field)| format!("{key}={}", inline(field)))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= SLOT_SUMMARY_CHARS {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(SLOT_SUMMARY_CHARS).collect();
    cut.push('…');
    cut
}
