//! What an agent hands back to the engine after one invocation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AgentId, TaskId};
use crate::phase::Phase;
use crate::state::{CodeRecord, ResultSlot};

/// Routing wish expressed by the agent that just ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoutingRequest {
    /// Forward hand-off or named jump to another agent
    Handoff {
        /// Agent that should run next
        agent: AgentId,
    },
    /// Request to return to an earlier agent for a correction cycle
    LoopBack {
        /// Agent to return to
        agent: AgentId,
        /// Why the loop is needed
        reason: String,
    },
    /// The agent considers the whole run finished
    Complete,
}

impl RoutingRequest {
    /// Target agent of a hand-off or loop-back.
    pub fn target(&self) -> Option<&AgentId> {
        match self {
            Self::Handoff { agent } | Self::LoopBack { agent, .. } => Some(agent),
            Self::Complete => None,
        }
    }

    /// Reason attached to the request, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::LoopBack { reason, .. } => Some(reason),
            Self::Handoff { .. } | Self::Complete => None,
        }
    }
}

/// Extra instruction attached to a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchNote {
    /// A permitted loop brought the workflow back to this agent
    Revision {
        /// Phase that asked for the revision
        from: Phase,
        /// Reason given by the requesting agent
        reason: String,
    },
    /// The agent's previous routing request was refused
    Correction {
        /// Why the request was refused
        reason: String,
    },
}

/// Payload produced by an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AgentOutput {
    /// Structured record extracted from the model output
    Structured(Value),
    /// Free text that could not be structured
    Text(String),
    /// Nothing produced
    #[default]
    Empty,
}

impl AgentOutput {
    /// Converts the output into the JSON value stored in a result slot.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Text(text) => Some(Value::String(text)),
            Self::Empty => None,
        }
    }
}

/// Delta returned by an agent; merged into the shared state by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the agent completed its work item
    pub success: bool,
    /// Structured record or free text
    pub output: AgentOutput,
    /// Result slot the output belongs to
    pub slot: Option<ResultSlot>,
    /// Requested routing, if the agent wants to influence it
    pub requested_next: Option<RoutingRequest>,
    /// Task to mark done
    pub completed_task: Option<TaskId>,
    /// Failure description
    pub error: Option<String>,
    /// Executor submissions made during this invocation, in order
    pub code_runs: Vec<CodeRecord>,
    /// Names of files written to the session workspace
    pub artifacts: Vec<String>,
}

impl AgentResult {
    /// A successful result carrying the given output.
    pub fn succeeded(output: AgentOutput) -> Self {
        Self {
            success: true,
            output,
            ..Self::default()
        }
    }

    /// A failed result with an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Sets the result slot.
    #[must_use]
    pub fn with_slot(mut self, slot: ResultSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Sets the completed task.
    #[must_use]
    pub fn with_completed_task(mut self, task: TaskId) -> Self {
        self.completed_task = Some(task);
        self
    }

    /// Sets the routing request.
    #[must_use]
    pub fn with_request(mut self, request: Option<RoutingRequest>) -> Self {
        self.requested_next = request;
        self
    }

    /// Attaches executor records.
    #[must_use]
    pub fn with_code_runs(mut self, code_runs: Vec<CodeRecord>) -> Self {
        self.code_runs = code_runs;
        self
    }

    /// Attaches artifact names.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_target_and_reason() {
        let request = RoutingRequest::LoopBack {
            agent: AgentId::BUSINESS_ANALYST,
            reason: "goals unclear".to_owned(),
        };
        assert_eq!(request.target(), Some(&AgentId::BUSINESS_ANALYST));
        assert_eq!(request.reason(), Some("goals unclear"));
        assert_eq!(RoutingRequest::Complete.target(), None);
    }

    #[test]
    fn test_failed_result_has_no_task() {
        let result = AgentResult::failed("llm timed out");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("llm timed out"));
        assert!(result.completed_task.is_none());
    }

    #[test]
    fn test_output_into_value() {
        assert_eq!(
            AgentOutput::Structured(json!({"rows": 3})).into_value(),
            Some(json!({"rows": 3}))
        );
        assert_eq!(
            AgentOutput::Text("plain".to_owned()).into_value(),
            Some(json!("plain"))
        );
        assert_eq!(AgentOutput::Empty.into_value(), None);
    }
}
