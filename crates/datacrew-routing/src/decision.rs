use datacrew_core::{AgentId, DispatchNote, Outcome, Phase};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the router ended a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// Final phase satisfied or terminal phase reached
    Completed,
    /// An agent declared the run finished
    AgentSignalled {
        /// Agent that sent the signal
        agent: AgentId,
    },
    /// Iteration ceiling reached
    ForcedStop {
        /// Configured ceiling
        limit: u32,
    },
    /// The state names something the table does not know
    RoutingFailure {
        /// What was wrong
        message: String,
    },
}

impl From<TerminationReason> for Outcome {
    fn from(value: TerminationReason) -> Self {
        match value {
            TerminationReason::Completed => Self::Completed,
            TerminationReason::AgentSignalled { agent } => Self::AgentSignalled { agent },
            TerminationReason::ForcedStop { limit } => Self::ForcedStop { limit },
            TerminationReason::RoutingFailure { message } => Self::Failed {
                error: format!("routing error: {message}"),
            },
        }
    }
}

/// What the router wants the engine to do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RoutingDecision {
    /// Enter `phase` and dispatch `agent`
    RunAgent {
        /// Agent to dispatch
        agent: AgentId,
        /// Phase to run it in
        phase: Phase,
        /// Revision note for a granted loop
        note: Option<DispatchNote>,
    },
    /// Stop the run
    Terminate(TerminationReason),
    /// Refuse the last agent's routing request; it is re-run in the unchanged phase
    Reject {
        /// Agent whose request was refused
        agent: AgentId,
        /// Why
        reason: String,
    },
}

impl RoutingDecision {
    pub(crate) const fn run(agent: AgentId, phase: Phase) -> Self {
        Self::RunAgent {
            agent,
            phase,
            note: None,
        }
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunAgent { agent, phase, note } => {
                write!(f, "run {agent} in {phase}")?;
                if let Some(DispatchNote::Revision { from, .. }) = note {
                    write!(f, " (revision requested from {from})")?;
                }
                Ok(())
            }
            Self::Terminate(reason) => {
                write!(f, "terminate: {}", Outcome::from(reason.clone()))
            }
            Self::Reject { agent, reason } => write!(f, "reject {agent}: {reason}"),
        }
    }
}
