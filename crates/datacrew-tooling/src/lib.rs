//! Code execution for agents.
//!
//! This crate provides the executor capability agents submit code to:
//! - `Executor` trait with a distinct timeout failure
//! - `ProcessExecutor` running a local interpreter under a wall-clock budget
//! - `RestartingExecutor` restarting once after an internal failure
//! - `ScriptedExecutor` for deterministic tests
//! - fenced code-block extraction from model output
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

/// Fenced code-block extraction.
pub mod code_blocks;
/// Executor trait and implementations.
pub mod executor;

pub use code_blocks::{CodeBlock, executable_blocks, extract_code_blocks};
pub use executor::{
    ExecutionOutput, Executor, ExecutorError, ExecutorResult, ProcessExecutor, RestartingExecutor,
    ScriptedExecutor, ScriptedRun,
};
