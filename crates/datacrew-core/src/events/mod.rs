//! Workflow events emitted by the engine, one dispatch/finish pair per cycle.
//!
//! A UI layer subscribes to the receiving half of an [`EventChannel`] instead
//! of scraping process output.

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, SessionId, TaskId};
use crate::outcome::Outcome;
use crate::phase::Phase;
use crate::result::DispatchNote;

/// Channel for workflow events
pub mod channel;

pub use channel::EventChannel;

/// Progress notification for observers of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// Run started
    Started {
        /// Session of the run
        session_id: SessionId,
        /// User request
        request: String,
    },
    /// Phase changed before a dispatch
    PhaseChanged {
        /// Previous phase
        from: Phase,
        /// New phase
        to: Phase,
    },
    /// An agent was dispatched
    Dispatched {
        /// Cycle number, starting at 1
        iteration: u32,
        /// Agent being run
        agent: AgentId,
        /// Phase it runs in
        phase: Phase,
        /// Revision or correction note
        note: Option<DispatchNote>,
    },
    /// An agent finished its invocation
    AgentFinished {
        /// Cycle number, starting at 1
        iteration: u32,
        /// Agent that ran
        agent: AgentId,
        /// Whether it succeeded
        success: bool,
        /// Task it completed
        completed_task: Option<TaskId>,
        /// Failure description
        error: Option<String>,
    },
    /// An agent's routing request was refused
    RoutingRejected {
        /// Agent that made the request
        agent: AgentId,
        /// Why it was refused
        reason: String,
    },
    /// Run finished
    Finished {
        /// Whether all required tasks were completed
        success: bool,
        /// Terminal reason
        outcome: Outcome,
    },
}
