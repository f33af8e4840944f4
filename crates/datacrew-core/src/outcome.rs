use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::AgentId;

/// How a workflow run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// The final phase's required tasks are complete
    Completed,
    /// An agent declared the run finished
    AgentSignalled {
        /// Agent that sent the completion signal
        agent: AgentId,
    },
    /// The iteration ceiling was reached before completion
    ForcedStop {
        /// Configured ceiling
        limit: u32,
    },
    /// The engine hit an unrecoverable error
    Failed {
        /// Triggering error message
        error: String,
    },
}

impl Outcome {
    /// Whether the run stopped for a reason other than finishing its work.
    pub const fn is_abnormal(&self) -> bool {
        matches!(self, Self::ForcedStop { .. } | Self::Failed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::AgentSignalled { agent } => write!(f, "completion signalled by {agent}"),
            Self::ForcedStop { limit } => {
                write!(f, "forced stop: iteration ceiling of {limit} reached")
            }
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forced_stop_is_distinct_from_completion() {
        let forced = Outcome::ForcedStop { limit: 10 };
        assert!(forced.is_abnormal());
        assert!(!Outcome::Completed.is_abnormal());
        assert!(forced.to_string().starts_with("forced stop"));
    }
}
