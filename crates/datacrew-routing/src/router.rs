//! Phase controller deciding which agent runs next.
//!
//! `decide` is a pure function of the shared state and the optional routing
//! request of the agent that just ran. Rules are applied in this order:
//!
//! 1. the state must name a declared phase and a known agent;
//! 2. a terminal phase, or a satisfied final phase, completes the run;
//! 3. a `Complete` request ends the run as signalled by its agent;
//! 4. reaching the iteration ceiling forces a stop;
//! 5. hand-off and loop-back requests are granted or rejected;
//! 6. otherwise the active phase advances when satisfied, or its owner is re-dispatched.

use datacrew_core::{AgentId, DispatchNote, NextAction, RoutingRequest, SharedState};
use tracing::debug;

use crate::decision::{RoutingDecision, TerminationReason};
use crate::error::{Result, RoutingError};
use crate::table::PhaseTable;

/// Deterministic phase controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Router {
    table: PhaseTable,
    max_iterations: u32,
}

impl Router {
    /// Creates a router over `table` that stops runs after `max_iterations` cycles.
    ///
    /// # Errors
    /// Returns [`RoutingError::ZeroCeiling`] when `max_iterations` is zero.
    pub fn new(table: PhaseTable, max_iterations: u32) -> Result<Self> {
        if max_iterations == 0 {
            return Err(RoutingError::ZeroCeiling);
        }
        Ok(Self {
            table,
            max_iterations,
        })
    }

    /// Router over the standard phase table.
    ///
    /// # Errors
    /// Returns [`RoutingError::ZeroCeiling`] when `max_iterations` is zero.
    pub fn standard(max_iterations: u32) -> Result<Self> {
        Self::new(PhaseTable::standard(), max_iterations)
    }

    /// Phase table consulted by this router.
    pub const fn table(&self) -> &PhaseTable {
        &self.table
    }

    /// Iteration ceiling.
    pub const fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Next step for `state` without an agent request.
    pub fn decide(&self, state: &SharedState) -> RoutingDecision {
        self.decide_with_request(state, None)
    }

    /// Next step for `state`, validating the last agent's routing request.
    pub fn decide_with_request(
        &self,
        state: &SharedState,
        request: Option<&RoutingRequest>,
    ) -> RoutingDecision {
        let phase = state.current_phase();

        if let Some(failure) = self.check_state(state) {
            return RoutingDecision::Terminate(failure);
        }

        if self.table.successor(phase).is_none() || self.final_phase_satisfied(state) {
            return RoutingDecision::Terminate(TerminationReason::Completed);
        }

        let requester = state.last_agent();

        if let (Some(RoutingRequest::Complete), Some(agent)) = (request, requester) {
            return RoutingDecision::Terminate(TerminationReason::AgentSignalled {
                agent: agent.clone(),
            });
        }

        if state.iteration_count() >= self.max_iterations {
            return RoutingDecision::Terminate(TerminationReason::ForcedStop {
                limit: self.max_iterations,
            });
        }

        if let (Some(request), Some(agent)) = (request, requester)
            && let Some(target) = request.target()
        {
            return self.route_request(state, agent, target, request.reason());
        }

        self.default_step(state)
    }

    /// Validates the parts of the state the router relies on.
    fn check_state(&self, state: &SharedState) -> Option<TerminationReason> {
        let phase = state.current_phase();
        if self.table.spec(phase).is_none() {
            return Some(TerminationReason::RoutingFailure {
                message: format!("phase {phase} is not declared"),
            });
        }
        if let Some(NextAction::Agent(agent)) = state.next_action()
            && !self.table.is_known_agent(agent)
        {
            return Some(TerminationReason::RoutingFailure {
                message: format!("next action names unknown agent {agent}"),
            });
        }
        None
    }

    fn final_phase_satisfied(&self, state: &SharedState) -> bool {
        self.table
            .final_phase()
            .is_some_and(|phase| self.table.is_satisfied(phase, state.completed_tasks()))
    }

    /// Default rule: advance when satisfied, otherwise re-dispatch the owner.
    fn default_step(&self, state: &SharedState) -> RoutingDecision {
        let phase = state.current_phase();
        let target = if self.table.is_satisfied(phase, state.completed_tasks()) {
            match self.table.successor(phase) {
                Some(next) if self.table.successor(next).is_none() => {
                    return RoutingDecision::Terminate(TerminationReason::Completed);
                }
                Some(next) => next,
                None => return RoutingDecision::Terminate(TerminationReason::Completed),
            }
        } else {
            phase
        };

        match self.table.owner(target) {
            Some(owner) => RoutingDecision::run(owner.clone(), target),
            None => RoutingDecision::Terminate(TerminationReason::RoutingFailure {
                message: format!("phase {target} has no owning agent"),
            }),
        }
    }

    /// Grants or rejects a hand-off or loop-back named by `requester`.
    fn route_request(
        &self,
        state: &SharedState,
        requester: &AgentId,
        target: &AgentId,
        reason: Option<&str>,
    ) -> RoutingDecision {
        let current = state.current_phase();
        let Some(target_phase) = self.table.request_target(current, target) else {
            return RoutingDecision::Reject {
                agent: requester.clone(),
                reason: format!("{target} is not a known agent"),
            };
        };

        if target_phase == current {
            let note = reason.map(|text| DispatchNote::Revision {
                from: current,
                reason: text.to_owned(),
            });
            return RoutingDecision::RunAgent {
                agent: target.clone(),
                phase: current,
                note,
            };
        }

        if self.table.allows_loop(current, target_phase) {
            debug!("Granting loop {} -> {}", current, target_phase);
            return RoutingDecision::RunAgent {
                agent: target.clone(),
                phase: target_phase,
                note: Some(DispatchNote::Revision {
                    from: current,
                    reason: reason.map_or_else(
                        || format!("{requester} handed the work back"),
                        str::to_owned,
                    ),
                }),
            };
        }

        match self.table.phases_between(current, target_phase) {
            Some(skipped) => {
                let completed = state.completed_tasks();
                let unsatisfied: Vec<String> = skipped
                    .iter()
                    .filter(|phase| !self.table.is_satisfied(**phase, completed))
                    .map(ToString::to_string)
                    .collect();
                if unsatisfied.is_empty() {
                    RoutingDecision::run(target.clone(), target_phase)
                } else {
                    RoutingDecision::Reject {
                        agent: requester.clone(),
                        reason: format!(
                            "cannot hand off from {current} to {target_phase}: {} not complete",
                            unsatisfied.join(", ")
                        ),
                    }
                }
            }
            None => RoutingDecision::Reject {
                agent: requester.clone(),
                reason: format!("loop from {current} to {target_phase} is not permitted"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacrew_core::{AgentResult, DatasetRef, Phase, TaskId};

    fn state_in(phase: Phase, completed: &[TaskId], last: Option<AgentId>) -> SharedState {
        let mut state = SharedState::new("profile dataset X", DatasetRef::new("x.csv"));
        state.enter_phase(phase);
        for task in completed {
            state.mark_completed(task.clone());
        }
        if let Some(agent) = last {
            state.set_next_action(NextAction::Agent(agent));
        }
        state
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        assert_eq!(Router::standard(0).unwrap_err(), RoutingError::ZeroCeiling);
    }

    #[test]
    fn test_start_dispatches_data_analyst() {
        let router = Router::standard(10).unwrap();
        let state = SharedState::new("profile dataset X", DatasetRef::new("x.csv"));
        assert_eq!(
            router.decide(&state),
            RoutingDecision::run(AgentId::DATA_ANALYST, Phase::DataUnderstanding)
        );
    }

    #[test]
    fn test_unsatisfied_phase_redispatches_owner() {
        let router = Router::standard(10).unwrap();
        let state = state_in(Phase::Modeling, &[], Some(AgentId::MODELER));
        assert_eq!(
            router.decide(&state),
            RoutingDecision::run(AgentId::MODELER, Phase::Modeling)
        );
    }

    #[test]
    fn test_final_phase_satisfied_completes() {
        let router = Router::standard(10).unwrap();
        let state = state_in(
            Phase::BusinessTranslation,
            &[TaskId::BUSINESS_TRANSLATION],
            Some(AgentId::BUSINESS_TRANSLATOR),
        );
        assert_eq!(
            router.decide(&state),
            RoutingDecision::Terminate(TerminationReason::Completed)
        );
    }

    #[test]
    fn test_ceiling_forces_stop() {
        let router = Router::standard(2).unwrap();
        let mut state = state_in(Phase::Modeling, &[], Some(AgentId::MODELER));
        state.increment_iteration();
        state.increment_iteration();
        assert_eq!(
            router.decide(&state),
            RoutingDecision::Terminate(TerminationReason::ForcedStop { limit: 2 })
        );
    }

    #[test]
    fn test_completion_wins_over_ceiling() {
        let router = Router::standard(1).unwrap();
        let mut state = state_in(
            Phase::BusinessTranslation,
            &[TaskId::BUSINESS_TRANSLATION],
            Some(AgentId::BUSINESS_TRANSLATOR),
        );
        state.increment_iteration();
        assert_eq!(
            router.decide(&state),
            RoutingDecision::Terminate(TerminationReason::Completed)
        );
    }

    #[test]
    fn test_complete_request_is_attributed_to_last_agent() {
        let router = Router::standard(10).unwrap();
        let state = state_in(Phase::Evaluation, &[], Some(AgentId::EVALUATOR));
        assert_eq!(
            router.decide_with_request(&state, Some(&RoutingRequest::Complete)),
            RoutingDecision::Terminate(TerminationReason::AgentSignalled {
                agent: AgentId::EVALUATOR
            })
        );
    }

    #[test]
    fn test_request_without_requester_is_ignored() {
        let router = Router::standard(10).unwrap();
        let state = SharedState::new("request", DatasetRef::new("x.csv"));
        let request = RoutingRequest::Handoff {
            agent: AgentId::MODELER,
        };
        assert_eq!(
            router.decide_with_request(&state, Some(&request)),
            router.decide(&state)
        );
    }

    #[test]
    fn test_unknown_next_action_is_fatal() {
        let router = Router::standard(10).unwrap();
        let state = state_in(Phase::Modeling, &[], Some(AgentId::new("ghost")));
        assert!(matches!(
            router.decide(&state),
            RoutingDecision::Terminate(TerminationReason::RoutingFailure { .. })
        ));
    }

    #[test]
    fn test_unknown_request_target_is_rejected() {
        let router = Router::standard(10).unwrap();
        let state = state_in(Phase::Modeling, &[], Some(AgentId::MODELER));
        let request = RoutingRequest::Handoff {
            agent: AgentId::new("ghost"),
        };
        assert!(matches!(
            router.decide_with_request(&state, Some(&request)),
            RoutingDecision::Reject { agent, .. } if agent == AgentId::MODELER
        ));
    }

    #[test]
    fn test_granted_loop_carries_revision_note() {
        let router = Router::standard(10).unwrap();
        let state = state_in(
            Phase::Evaluation,
            &[TaskId::MODEL_TRAINING],
            Some(AgentId::EVALUATOR),
        );
        let request = RoutingRequest::LoopBack {
            agent: AgentId::MODELER,
            reason: "recall below target".to_owned(),
        };
        assert_eq!(
            router.decide_with_request(&state, Some(&request)),
            RoutingDecision::RunAgent {
                agent: AgentId::MODELER,
                phase: Phase::Modeling,
                note: Some(DispatchNote::Revision {
                    from: Phase::Evaluation,
                    reason: "recall below target".to_owned(),
                }),
            }
        );
    }

    #[test]
    fn test_loops_into_data_preparation_are_granted() {
        let router = Router::standard(10).unwrap();
        let completed = [
            TaskId::DATA_PROFILING,
            TaskId::DATA_PREPROCESSING,
            TaskId::FEATURE_ENGINEERING,
        ];
        for (phase, requester) in [
            (Phase::FeatureEngineering, AgentId::DATA_ENGINEER),
            (Phase::Modeling, AgentId::MODELER),
        ] {
            assert!(router.table().allows_loop(phase, Phase::DataPreparation));
            let state = state_in(phase, &completed, Some(requester));
            let request = RoutingRequest::LoopBack {
                agent: AgentId::DATA_ANALYST,
                reason: "tenure has outliers".to_owned(),
            };
            assert_eq!(
                router.decide_with_request(&state, Some(&request)),
                RoutingDecision::RunAgent {
                    agent: AgentId::DATA_ANALYST,
                    phase: Phase::DataPreparation,
                    note: Some(DispatchNote::Revision {
                        from: phase,
                        reason: "tenure has outliers".to_owned(),
                    }),
                }
            );
        }
    }

    #[test]
    fn test_handoff_to_self_in_second_owned_phase_reruns() {
        let router = Router::standard(10).unwrap();
        let state = state_in(
            Phase::DataPreparation,
            &[TaskId::DATA_PROFILING],
            Some(AgentId::DATA_ANALYST),
        );
        let request = RoutingRequest::Handoff {
            agent: AgentId::DATA_ANALYST,
        };
        assert_eq!(
            router.decide_with_request(&state, Some(&request)),
            RoutingDecision::run(AgentId::DATA_ANALYST, Phase::DataPreparation)
        );
    }

    #[test]
    fn test_unlisted_loop_to_multi_phase_owner_rejected() {
        let router = Router::standard(10).unwrap();
        let state = state_in(Phase::Evaluation, &[], Some(AgentId::EVALUATOR));
        let request = RoutingRequest::LoopBack {
            agent: AgentId::DATA_ANALYST,
            reason: "redo the profile".to_owned(),
        };
        assert!(matches!(
            router.decide_with_request(&state, Some(&request)),
            RoutingDecision::Reject { ref reason, .. } if reason.contains("not permitted")
        ));
    }

    #[test]
    fn test_forward_handoff_over_satisfied_phases() {
        let router = Router::standard(10).unwrap();
        let state = state_in(
            Phase::DataUnderstanding,
            &[TaskId::DATA_PROFILING, TaskId::DATA_PREPROCESSING],
            Some(AgentId::DATA_ANALYST),
        );
        let request = RoutingRequest::Handoff {
            agent: AgentId::DATA_ENGINEER,
        };
        assert_eq!(
            router.decide_with_request(&state, Some(&request)),
            RoutingDecision::run(AgentId::DATA_ENGINEER, Phase::FeatureEngineering)
        );
    }

    #[test]
    fn test_unlisted_backward_jump_rejected() {
        let router = Router::standard(10).unwrap();
        let state = state_in(
            Phase::DataPreparation,
            &[TaskId::DATA_PROFILING],
            Some(AgentId::DATA_ANALYST),
        );
        let request = RoutingRequest::LoopBack {
            agent: AgentId::BUSINESS_ANALYST,
            reason: "unclear goals".to_owned(),
        };
        let decision = router.decide_with_request(&state, Some(&request));
        assert!(matches!(
            decision,
            RoutingDecision::Reject { ref reason, .. } if reason.contains("not permitted")
        ));
    }

    #[test]
    fn test_decide_is_deterministic() {
        let router = Router::standard(10).unwrap();
        let mut state = state_in(Phase::Evaluation, &[], Some(AgentId::EVALUATOR));
        state.merge(
            &AgentId::EVALUATOR,
            AgentResult::failed("model rejected"),
        );
        let request = RoutingRequest::LoopBack {
            agent: AgentId::DATA_ENGINEER,
            reason: "features leak the target".to_owned(),
        };
        let first = router.decide_with_request(&state, Some(&request));
        let second = router.decide_with_request(&state.clone(), Some(&request.clone()));
        assert_eq!(first, second);
    }
}
