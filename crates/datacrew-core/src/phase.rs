//! Pipeline phases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A named stage of the pipeline gating which agent may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Initial phase of every session
    Start,
    /// Goals and success criteria (entered through goal revision)
    BusinessUnderstanding,
    /// Dataset profiling
    DataUnderstanding,
    /// Cleaning and preprocessing
    DataPreparation,
    /// Feature derivation
    FeatureEngineering,
    /// Model training
    Modeling,
    /// Model evaluation against the goals
    Evaluation,
    /// Recommendation for the business audience
    BusinessTranslation,
    /// Terminal phase
    Completed,
}

impl Phase {
    /// All phases in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Start,
        Self::BusinessUnderstanding,
        Self::DataUnderstanding,
        Self::DataPreparation,
        Self::FeatureEngineering,
        Self::Modeling,
        Self::Evaluation,
        Self::BusinessTranslation,
        Self::Completed,
    ];

    /// Returns the `snake_case` identifier of this phase.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::BusinessUnderstanding => "business_understanding",
            Self::DataUnderstanding => "data_understanding",
            Self::DataPreparation => "data_preparation",
            Self::FeatureEngineering => "feature_engineering",
            Self::Modeling => "modeling",
            Self::Evaluation => "evaluation",
            Self::BusinessTranslation => "business_translation",
            Self::Completed => "completed",
        }
    }

    /// Whether this is the terminal phase.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == s.trim())
            .ok_or_else(|| Error::Other(format!("Unknown phase: {s}")))
    }
}
