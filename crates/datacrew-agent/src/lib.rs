//! Agents, output extraction, the workflow engine and session storage.
//!
//! This crate provides the moving parts of a datacrew run:
//!
//! - **Agents**: one [`Agent`] trait, implemented by [`RoleAgent`] and configured by [`RoleSpec`] values
//! - **Extraction**: tolerant parsing of model output into structured records and routing requests
//! - **Engine**: the [`WorkflowEngine`] loop producing a [`FinalReport`]
//! - **Workspace**: per-session storage of checkpoints, reports and artifacts
//!
//! # Example
//!
//! ```no_run
//! use datacrew_agent::{WorkflowEngine, builtin_agents};
//! use datacrew_core::{DatacrewConfig, DatasetRef};
//! use datacrew_providers::MockProvider;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatacrewConfig::default();
//! let agents = builtin_agents(Arc::new(MockProvider::new()), None, &config);
//! let engine = WorkflowEngine::from_config(&config, agents)?;
//!
//! let report = engine.execute("predict churn", DatasetRef::new("churn.csv")).await;
//! assert!(report.iterations <= config.workflow.max_iterations);
//! # Ok(())
//! # }
//! ```
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

use std::sync::Arc;

use datacrew_core::{DatacrewConfig, ModelProvider};
use datacrew_tooling::Executor;

/// Agent contract and role-configured agents
pub mod agent;
/// Workflow engine and final report
pub mod engine;
/// Structured extraction from model output
pub mod extract;
/// Session workspace storage
pub mod workspace;

pub use agent::{Agent, Completion, RoleAgent, RoleSpec, WorkItem};
pub use engine::{FinalReport, WorkflowEngine};
pub use extract::{ExtractError, ScrapeKind, extract_record, parse_routing};
pub use workspace::{
    Content, FileWorkspace, MemoryWorkspace, StoreError, WorkspaceStore, load_state, save_state,
};

/// The six built-in roles backed by `provider`, configured from `config`.
pub fn builtin_agents(
    provider: Arc<dyn ModelProvider>,
    executor: Option<Arc<dyn Executor>>,
    config: &DatacrewConfig,
) -> Vec<Arc<dyn Agent>> {
    RoleSpec::builtin()
        .into_iter()
        .map(|spec| {
            let mut agent = RoleAgent::new(spec, Arc::clone(&provider))
                .with_policy(config.workflow.extraction_policy)
                .with_llm_timeout(config.llm.timeout());
            if let Some(executor) = &executor {
                agent = agent.with_executor(Arc::clone(executor));
            }
            Arc::new(agent) as Arc<dyn Agent>
        })
        .collect()
}
