//! Phase controller for the datacrew workflow.
//!
//! Holds the phase model (required tasks, owning agents, successors and the
//! loop allow-list) and the pure routing function deciding which agent runs
//! next, when a loop-back is granted and when a run terminates.
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

/// Routing decisions and termination reasons.
pub mod decision;
/// Routing configuration errors.
pub mod error;
/// The router.
pub mod router;
/// Phase table and loop allow-list.
pub mod table;

pub use decision::{RoutingDecision, TerminationReason};
pub use error::{Result, RoutingError};
pub use router::Router;
pub use table::{PhaseSpec, PhaseTable};
