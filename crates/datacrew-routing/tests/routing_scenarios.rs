//! Routing scenarios driven through `SharedState` the way the engine applies decisions.

#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use datacrew_core::{
    AgentId, AgentOutput, AgentResult, DatasetRef, DispatchNote, NextAction, Phase,
    RoutingRequest, SharedState, TaskId,
};
use datacrew_routing::{PhaseTable, Router, RoutingDecision, TerminationReason};

/// Applies a decision the way the engine does: enter the phase, record the agent, count the cycle.
fn apply(state: &mut SharedState, decision: &RoutingDecision) {
    match decision {
        RoutingDecision::RunAgent { agent, phase, .. } => {
            state.enter_phase(*phase);
            state.set_next_action(NextAction::Agent(agent.clone()));
        }
        RoutingDecision::Reject { agent, .. } => {
            state.set_next_action(NextAction::Agent(agent.clone()));
        }
        RoutingDecision::Terminate(_) => state.set_next_action(NextAction::Terminate),
    }
    state.increment_iteration();
}

fn fresh_state() -> SharedState {
    SharedState::new("profile dataset X", DatasetRef::new("datasets/x.csv"))
}

#[test]
fn test_first_cycle_enters_data_understanding() {
    let router = Router::standard(10).unwrap();
    let mut state = fresh_state();

    let decision = router.decide(&state);
    apply(&mut state, &decision);

    assert_eq!(state.current_phase(), Phase::DataUnderstanding);
    assert_eq!(
        state.next_action(),
        Some(&NextAction::Agent(AgentId::DATA_ANALYST))
    );
    assert_eq!(state.iteration_count(), 1);
}

#[test]
fn test_profiling_done_advances_to_preparation_with_same_agent() {
    let router = Router::standard(10).unwrap();
    let mut state = fresh_state();
    let decision = router.decide(&state);
    apply(&mut state, &decision);

    state.merge(
        &AgentId::DATA_ANALYST,
        AgentResult::succeeded(AgentOutput::Text("profiled".to_owned()))
            .with_completed_task(TaskId::DATA_PROFILING),
    );
    let decision = router.decide(&state);

    assert_eq!(
        decision,
        RoutingDecision::RunAgent {
            agent: AgentId::DATA_ANALYST,
            phase: Phase::DataPreparation,
            note: None,
        }
    );
    apply(&mut state, &decision);
    assert_eq!(state.current_phase(), Phase::DataPreparation);
}

#[test]
fn test_evaluator_goal_revision_is_granted() {
    let router = Router::standard(20).unwrap();
    let mut state = fresh_state();
    state.enter_phase(Phase::Evaluation);
    state.set_next_action(NextAction::Agent(AgentId::EVALUATOR));
    let before = state.iteration_count();

    let request = RoutingRequest::LoopBack {
        agent: AgentId::BUSINESS_ANALYST,
        reason: "success criteria unrealistic".to_owned(),
    };
    let decision = router.decide_with_request(&state, Some(&request));
    assert!(matches!(
        &decision,
        RoutingDecision::RunAgent {
            agent,
            phase: Phase::BusinessUnderstanding,
            note: Some(DispatchNote::Revision { from: Phase::Evaluation, .. }),
        } if *agent == AgentId::BUSINESS_ANALYST
    ));

    apply(&mut state, &decision);
    assert_eq!(state.current_phase(), Phase::BusinessUnderstanding);
    assert_eq!(
        state.next_action(),
        Some(&NextAction::Agent(AgentId::BUSINESS_ANALYST))
    );
    assert_eq!(state.iteration_count(), before + 1);
}

#[test]
fn test_skipping_ahead_is_rejected_and_phase_is_unchanged() {
    let router = Router::standard(20).unwrap();
    let mut state = fresh_state();
    let decision = router.decide(&state);
    apply(&mut state, &decision);
    assert_eq!(state.current_phase(), Phase::DataUnderstanding);

    let request = RoutingRequest::Handoff {
        agent: AgentId::DATA_ENGINEER,
    };
    let decision = router.decide_with_request(&state, Some(&request));
    assert!(matches!(
        &decision,
        RoutingDecision::Reject { agent, reason }
            if *agent == AgentId::DATA_ANALYST && reason.contains("data_understanding")
    ));

    apply(&mut state, &decision);
    assert_eq!(state.current_phase(), Phase::DataUnderstanding);
    assert_eq!(
        state.next_action(),
        Some(&NextAction::Agent(AgentId::DATA_ANALYST))
    );
}

#[test]
fn test_full_forward_run_terminates_as_completed() {
    let router = Router::standard(20).unwrap();
    let mut state = fresh_state();

    loop {
        let decision = router.decide(&state);
        let RoutingDecision::RunAgent { agent, phase, .. } = decision.clone() else {
            assert_eq!(
                decision,
                RoutingDecision::Terminate(TerminationReason::Completed)
            );
            break;
        };
        apply(&mut state, &decision);
        let task = router.table().spec(phase).unwrap().required_tasks[0].clone();
        state.merge(
            &agent,
            AgentResult::succeeded(AgentOutput::Empty).with_completed_task(task),
        );
    }

    assert_eq!(state.iteration_count(), 6);
    for task in router.table().required_tasks() {
        assert!(state.is_completed(&task));
    }
}

#[test]
fn test_ceiling_stops_non_converging_run() {
    let router = Router::standard(10).unwrap();
    let mut state = fresh_state();

    let decision = loop {
        let decision = router.decide(&state);
        if matches!(decision, RoutingDecision::Terminate(_)) {
            break decision;
        }
        apply(&mut state, &decision);
    };

    assert_eq!(
        decision,
        RoutingDecision::Terminate(TerminationReason::ForcedStop { limit: 10 })
    );
    assert_eq!(state.iteration_count(), 10);
    assert!(state.completed_tasks().is_empty());
}

#[test]
fn test_feature_engineering_loop_reenters_preparation_then_returns() {
    let router = Router::standard(20).unwrap();
    let mut state = fresh_state();
    for task in [TaskId::DATA_PROFILING, TaskId::DATA_PREPROCESSING] {
        state.mark_completed(task);
    }
    state.enter_phase(Phase::FeatureEngineering);
    state.set_next_action(NextAction::Agent(AgentId::DATA_ENGINEER));

    let request = RoutingRequest::LoopBack {
        agent: AgentId::DATA_ANALYST,
        reason: "categorical columns are not encoded".to_owned(),
    };
    let decision = router.decide_with_request(&state, Some(&request));
    assert!(matches!(
        &decision,
        RoutingDecision::RunAgent {
            agent,
            phase: Phase::DataPreparation,
            note: Some(DispatchNote::Revision { from: Phase::FeatureEngineering, .. }),
        } if *agent == AgentId::DATA_ANALYST
    ));
    apply(&mut state, &decision);
    assert_eq!(state.current_phase(), Phase::DataPreparation);

    state.merge(
        &AgentId::DATA_ANALYST,
        AgentResult::succeeded(AgentOutput::Empty)
            .with_completed_task(TaskId::DATA_PREPROCESSING),
    );
    assert_eq!(
        router.decide(&state),
        RoutingDecision::RunAgent {
            agent: AgentId::DATA_ENGINEER,
            phase: Phase::FeatureEngineering,
            note: None,
        }
    );
}

#[test]
fn test_phase_table_and_decisions_survive_json() {
    let router = Router::standard(20).unwrap();
    let encoded = serde_json::to_string(router.table()).unwrap();
    let decoded: PhaseTable = serde_json::from_str(&encoded).unwrap();
    assert_eq!(&decoded, router.table());
    assert!(decoded.allows_loop(Phase::Modeling, Phase::DataPreparation));

    let decision = RoutingDecision::Terminate(TerminationReason::ForcedStop { limit: 20 });
    let encoded = serde_json::to_value(&decision).unwrap();
    let decoded: RoutingDecision = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, decision);
}
