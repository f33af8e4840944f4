//! The agent contract and its role-configured implementation.

use async_trait::async_trait;
use datacrew_core::{AgentId, AgentResult, DispatchNote, Phase, SharedState};
use serde_json::Value;

use crate::extract::ExtractError;

/// Role catalogue.
pub mod role;
/// LLM-backed agent driven by a role spec.
pub mod role_agent;

pub use role::{Completion, RoleSpec, WorkItem};
pub use role_agent::RoleAgent;

/// A role-bound unit of work dispatched by the workflow engine.
///
/// Agents read the shared state and return a delta; they never mutate the
/// state themselves and never fail past [`Agent::run`].
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identifier the router dispatches.
    fn id(&self) -> &AgentId;

    /// Whether the agent has work in the state's current phase.
    fn should_execute(&self, state: &SharedState) -> bool;

    /// Work item handed to the model for the current phase.
    fn build_task(&self, state: &SharedState, note: Option<&DispatchNote>) -> String;

    /// Structured record for `phase` from raw model output.
    ///
    /// # Errors
    /// Returns an [`ExtractError`] when the output carries no usable structure.
    fn extract(&self, phase: Phase, output: &str) -> Result<Value, ExtractError>;

    /// Performs one invocation. Failures are reported through
    /// [`AgentResult::success`] and [`AgentResult::error`].
    async fn run(&self, state: &SharedState, note: Option<&DispatchNote>) -> AgentResult;
}
