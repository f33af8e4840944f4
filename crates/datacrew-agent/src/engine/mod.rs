//! The outer driver loop: router, agent, merge, repeat.
//!
//! The engine exclusively owns the [`SharedState`] of a run. Agents get a
//! read view and return an [`AgentResult`] that is merged here; the router
//! is consulted before every dispatch. `execute` never fails: agent errors are
//! recorded and retried, panics and routing failures end the run with a
//! failure report.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use datacrew_core::{
    AgentId, AgentResult, DatacrewConfig, DatasetRef, DispatchNote, EventChannel, NextAction,
    Outcome, Phase, RoutingRequest, SharedState, WorkflowEvent,
};
use datacrew_routing::{Router, RoutingDecision, TerminationReason};
use futures::FutureExt as _;
use tracing::{debug, error, info, warn};

use crate::agent::Agent;
use crate::workspace::{
    Content, REPORT_FILE, REPORT_MARKDOWN_FILE, StoreResult, WorkspaceStore, save_state,
};

/// Final report assembly.
pub mod report;

pub use report::FinalReport;

/// Sequential multi-agent workflow driver.
pub struct WorkflowEngine {
    router: Router,
    agents: BTreeMap<AgentId, Arc<dyn Agent>>,
    max_iterations: u32,
    events: EventChannel,
    store: Option<Arc<dyn WorkspaceStore>>,
    checkpoint: bool,
}

/// One dispatch the loop is about to perform.
struct Dispatch {
    agent: AgentId,
    phase: Phase,
    note: Option<DispatchNote>,
}

impl WorkflowEngine {
    /// Creates an engine dispatching `agents` under `router`.
    ///
    /// The engine's own ceiling starts equal to the router's.
    pub fn new(router: Router, agents: impl IntoIterator<Item = Arc<dyn Agent>>) -> Self {
        let max_iterations = router.max_iterations();
        Self {
            router,
            agents: agents
                .into_iter()
                .map(|agent| (agent.id().clone(), agent))
                .collect(),
            max_iterations,
            events: EventChannel::disconnected(),
            store: None,
            checkpoint: false,
        }
    }

    /// Creates an engine over the standard phase table using the workflow settings of `config`.
    ///
    /// # Errors
    /// Returns a routing error when the configured ceiling is zero.
    pub fn from_config(
        config: &DatacrewConfig,
        agents: impl IntoIterator<Item = Arc<dyn Agent>>,
    ) -> datacrew_routing::Result<Self> {
        let router = Router::standard(config.workflow.max_iterations)?;
        let mut engine = Self::new(router, agents);
        engine.checkpoint = config.workflow.checkpoint;
        Ok(engine)
    }

    /// Publishes progress on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventChannel) -> Self {
        self.events = events;
        self
    }

    /// Persists checkpoints and the final report to `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn WorkspaceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Enables or disables the per-cycle `state.json` checkpoint.
    #[must_use]
    pub const fn with_checkpoint(mut self, checkpoint: bool) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    /// Sets the engine's own ceiling, checked independently of the router's.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Router consulted before every dispatch.
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Runs a fresh session for `request` over `dataset`.
    pub async fn execute(&self, request: impl Into<String>, dataset: DatasetRef) -> FinalReport {
        self.execute_state(SharedState::new(request, dataset)).await
    }

    /// Runs the loop from an existing state, such as a restored checkpoint.
    pub async fn execute_state(&self, mut state: SharedState) -> FinalReport {
        info!(
            "Starting session {} in phase {}: {}",
            state.session_id(),
            state.current_phase(),
            state.request()
        );
        self.events.send(WorkflowEvent::Started {
            session_id: state.session_id(),
            request: state.request().to_owned(),
        });

        let outcome = self.run_loop(&mut state).await;
        self.finish(state, outcome)
    }

    async fn run_loop(&self, state: &mut SharedState) -> Outcome {
        let mut pending: Option<RoutingRequest> = None;

        loop {
            let decision = self.router.decide_with_request(state, pending.as_ref());
            debug!("Routing decision: {decision}");

            let dispatch = match decision {
                RoutingDecision::Terminate(reason) => return reason.into(),
                RoutingDecision::RunAgent { agent, phase, note } => Dispatch { agent, phase, note },
                RoutingDecision::Reject { agent, reason } => {
                    warn!("Rejected routing request from {agent}: {reason}");
                    state.record_error(format!(
                        "[iteration {}] {agent}: routing request rejected: {reason}",
                        state.iteration_count()
                    ));
                    self.events.send(WorkflowEvent::RoutingRejected {
                        agent: agent.clone(),
                        reason: reason.clone(),
                    });
                    Dispatch {
                        agent,
                        phase: state.current_phase(),
                        note: Some(DispatchNote::Correction { reason }),
                    }
                }
            };

            if state.iteration_count() >= self.max_iterations {
                return TerminationReason::ForcedStop {
                    limit: self.max_iterations,
                }
                .into();
            }

            pending = match self.run_cycle(state, dispatch).await {
                Ok(request) => request,
                Err(outcome) => return outcome,
            };
            self.checkpoint(state);
        }
    }

    /// Dispatches one agent and merges its result.
    ///
    /// Returns the routing request of a successful result; `Err` ends the run.
    async fn run_cycle(
        &self,
        state: &mut SharedState,
        dispatch: Dispatch,
    ) -> Result<Option<RoutingRequest>, Outcome> {
        let Dispatch { agent, phase, note } = dispatch;

        let Some(runner) = self.agents.get(&agent) else {
            let message = format!("no agent registered as {agent}");
            state.record_error(message.clone());
            return Err(Outcome::Failed { error: message });
        };

        if let Some(transition) = state.enter_phase(phase) {
            info!("Phase {} -> {}", transition.from, transition.to);
            self.events.send(WorkflowEvent::PhaseChanged {
                from: transition.from,
                to: transition.to,
            });
        }

        if !runner.should_execute(state) {
            let message = format!("{agent} has no work in phase {phase}");
            state.record_error(message.clone());
            return Err(Outcome::Failed { error: message });
        }

        state.set_next_action(NextAction::Agent(agent.clone()));
        let iteration = state.iteration_count() + 1;
        info!("Iteration {iteration}: dispatching {agent} in {phase}");
        self.events.send(WorkflowEvent::Dispatched {
            iteration,
            agent: agent.clone(),
            phase,
            note: note.clone(),
        });

        let result = match AssertUnwindSafe(runner.run(state, note.as_ref()))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = format!("{agent} panicked: {}", panic_message(payload.as_ref()));
                error!("{message}");
                state.record_error(format!("[iteration {}] {message}", state.iteration_count()));
                state.increment_iteration();
                self.events.send(WorkflowEvent::AgentFinished {
                    iteration,
                    agent,
                    success: false,
                    completed_task: None,
                    error: Some(message.clone()),
                });
                return Err(Outcome::Failed { error: message });
            }
        };

        Ok(self.merge(state, &agent, iteration, result))
    }

    fn merge(
        &self,
        state: &mut SharedState,
        agent: &AgentId,
        iteration: u32,
        result: AgentResult,
    ) -> Option<RoutingRequest> {
        let success = result.success;
        let completed_task = result.completed_task.clone();
        let error = result.error.clone();
        let request = result.requested_next.clone().filter(|_| success);

        if let Some(message) = &error {
            warn!("{agent} failed in iteration {iteration}: {message}");
        }

        let merged = state.merge(agent, result);
        if let Some(slot) = merged.refused_slot {
            warn!("Refused write to {slot:?} by {agent}");
        }
        if let Some(task) = &merged.newly_completed {
            info!("Task {task} completed by {agent}");
        }
        state.increment_iteration();

        self.events.send(WorkflowEvent::AgentFinished {
            iteration,
            agent: agent.clone(),
            success,
            completed_task,
            error,
        });
        request
    }

    fn checkpoint(&self, state: &SharedState) {
        if !self.checkpoint {
            return;
        }
        if let Some(store) = &self.store
            && let Err(error) = save_state(store.as_ref(), state)
        {
            warn!("Failed to checkpoint session {}: {error}", state.session_id());
        }
    }

    fn finish(&self, mut state: SharedState, outcome: Outcome) -> FinalReport {
        state.set_next_action(NextAction::Terminate);
        match &outcome {
            Outcome::ForcedStop { .. } | Outcome::Failed { .. } => {
                error!("Session {} stopped: {outcome}", state.session_id());
            }
            Outcome::Completed | Outcome::AgentSignalled { .. } => {
                info!("Session {} finished: {outcome}", state.session_id());
            }
        }

        let required = self.router.table().required_tasks();
        let report = FinalReport::new(state, outcome, &required);
        self.events.send(WorkflowEvent::Finished {
            success: report.success,
            outcome: report.outcome.clone(),
        });

        if let Some(store) = &self.store
            && let Err(error) = persist(store.as_ref(), &report)
        {
            warn!("Failed to persist report for {}: {error}", report.session_id);
        }
        report
    }
}

fn persist(store: &dyn WorkspaceStore, report: &FinalReport) -> StoreResult<()> {
    save_state(store, &report.state)?;
    store.write(
        report.session_id,
        REPORT_FILE,
        &Content::Structured(serde_json::to_value(report)?),
    )?;
    store.write(
        report.session_id,
        REPORT_MARKDOWN_FILE,
        &Content::Text(report.to_markdown()),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
