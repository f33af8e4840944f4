//! Identifiers for sessions, agents and tasks.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a workflow session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Wraps an existing UUID (used when restoring checkpoints).
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of an agent known to the workflow.
///
/// Built-in roles are exposed as associated constants; custom phase tables may
/// use any other name as long as an agent with that name is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(Cow<'static, str>);

impl AgentId {
    /// Business analyst: turns the request into goals and success criteria.
    pub const BUSINESS_ANALYST: Self = Self(Cow::Borrowed("business_analyst"));
    /// Data analyst: profiles and prepares the dataset.
    pub const DATA_ANALYST: Self = Self(Cow::Borrowed("data_analyst"));
    /// Data engineer: derives model features.
    pub const DATA_ENGINEER: Self = Self(Cow::Borrowed("data_engineer"));
    /// Modeler: trains candidate models.
    pub const MODELER: Self = Self(Cow::Borrowed("modeler"));
    /// Evaluator: judges model results against the goals.
    pub const EVALUATOR: Self = Self(Cow::Borrowed("evaluator"));
    /// Business translator: writes the final recommendation.
    pub const BUSINESS_TRANSLATOR: Self = Self(Cow::Borrowed("business_translator"));

    /// Creates an agent id from an arbitrary name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the agent name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// All built-in role identifiers in pipeline order.
    pub fn builtin() -> [Self; 6] {
        [
            Self::BUSINESS_ANALYST,
            Self::DATA_ANALYST,
            Self::DATA_ENGINEER,
            Self::MODELER,
            Self::EVALUATOR,
            Self::BUSINESS_TRANSLATOR,
        ]
    }

    /// Parses a loosely written agent name as it appears in model output.
    ///
    /// Accepts `data-analyst`, `Data Analyst` and `data_analyst` alike.
    pub fn parse_loose(text: &str) -> Self {
        let normalized: String = text
            .trim()
            .chars()
            .map(|character| match character {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        Self::builtin()
            .into_iter()
            .find(|agent| agent.as_str() == normalized)
            .unwrap_or_else(|| Self::new(normalized))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a unit of work whose completion gates phase transitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Cow<'static, str>);

impl TaskId {
    /// Business goals and success criteria agreed.
    pub const BUSINESS_GOALS: Self = Self(Cow::Borrowed("business_goals"));
    /// Dataset profiled.
    pub const DATA_PROFILING: Self = Self(Cow::Borrowed("data_profiling"));
    /// Dataset cleaned and preprocessed.
    pub const DATA_PREPROCESSING: Self = Self(Cow::Borrowed("data_preprocessing"));
    /// Model features derived.
    pub const FEATURE_ENGINEERING: Self = Self(Cow::Borrowed("feature_engineering"));
    /// Candidate models trained.
    pub const MODEL_TRAINING: Self = Self(Cow::Borrowed("model_training"));
    /// Model results approved by the evaluator.
    pub const MODEL_EVALUATION: Self = Self(Cow::Borrowed("model_evaluation"));
    /// Results translated into a business recommendation.
    pub const BUSINESS_TRANSLATION: Self = Self(Cow::Borrowed("business_translation"));

    /// Creates a task id from an arbitrary name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the task name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
