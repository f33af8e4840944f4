//! Core types and traits for the datacrew workflow.
//!
//! This crate provides the shared state record threaded through a run, the
//! agent result delta, identifiers, configuration, error handling, workflow
//! events and the LLM capability trait used by every other crate.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Allow for tests"
    )
)]

/// Configuration loading and defaults.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Workflow events and the event channel.
pub mod events;
/// Session, agent and task identifiers.
pub mod ids;
/// Terminal outcome of a run.
pub mod outcome;
/// Pipeline phases.
pub mod phase;
/// Agent result delta and routing requests.
pub mod result;
/// Shared workflow state.
pub mod state;
/// Lock helpers.
pub mod sync;
/// Trait definitions for model providers.
pub mod traits;
/// Query, response and context types for model calls.
pub mod types;

pub use config::{
    DatacrewConfig, ExecutorConfig, ExtractionPolicy, LlmConfig, ProviderKind, WorkflowConfig,
    WorkspaceConfig,
};
pub use error::{Error, Result};
pub use events::{EventChannel, WorkflowEvent};
pub use ids::{AgentId, SessionId, TaskId};
pub use outcome::Outcome;
pub use phase::Phase;
pub use result::{AgentOutput, AgentResult, DispatchNote, RoutingRequest};
pub use state::{
    CodeRecord, DatasetRef, MergeOutcome, NextAction, PhaseTransition, ResultSlot, SharedState,
    SlotRecord,
};
pub use sync::{IgnoreLock, IgnoreRwLock};
pub use traits::ModelProvider;
pub use types::{Context, ContextSection, Query, Response, TokenUsage};
