//! Errors raised while building a phase table or router.

use datacrew_core::Phase;
use std::result::Result as StdResult;
use thiserror::Error;

/// Result type alias using `RoutingError`.
pub type Result<T> = StdResult<T, RoutingError>;

/// A phase table or router configuration that cannot route a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// A phase appears twice in the table
    #[error("Phase {0} is declared more than once")]
    DuplicatePhase(Phase),

    /// A successor or loop endpoint is not declared
    #[error("Phase {0} is referenced but not declared")]
    UnknownPhase(Phase),

    /// The table has no `start` phase
    #[error("Phase table has no start phase")]
    MissingStart,

    /// A phase with required tasks has nobody to do them
    #[error("Phase {0} has required tasks but no owning agent")]
    MissingOwner(Phase),

    /// Following successors from `start` never reaches a terminal phase
    #[error("Forward path from start does not reach a terminal phase (stuck at {0})")]
    UnterminatedPath(Phase),

    /// The iteration ceiling must allow at least one cycle
    #[error("Iteration ceiling must be at least 1")]
    ZeroCeiling,
}
