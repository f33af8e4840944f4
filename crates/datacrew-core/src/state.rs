//! The single record threaded through a workflow run.
//!
//! Agents receive `&SharedState` and return an [`AgentResult`]; only the
//! engine calls the mutating methods below. Collections are append-only:
//! completed tasks are never removed and the iteration counter never
//! decreases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::ids::{AgentId, SessionId, TaskId};
use crate::phase::Phase;
use crate::result::AgentResult;

/// Reference to the dataset a session works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetRef(String);

impl DatasetRef {
    /// Creates a dataset reference (a path or URI).
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Returns the reference as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named result slot. Each slot has exactly one owning agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSlot {
    /// Objectives and success criteria
    BusinessGoals,
    /// Dataset profile
    DataProfile,
    /// Cleaning and preprocessing steps
    PreparationReport,
    /// Derived features
    FeatureReport,
    /// Trained models and metrics
    ModelResults,
    /// Evaluator verdict
    Evaluation,
    /// Final business recommendation
    Recommendation,
}

impl ResultSlot {
    /// All slots in report order.
    pub const ALL: [Self; 7] = [
        Self::BusinessGoals,
        Self::DataProfile,
        Self::PreparationReport,
        Self::FeatureReport,
        Self::ModelResults,
        Self::Evaluation,
        Self::Recommendation,
    ];

    /// The agent allowed to write this slot.
    pub const fn owner(self) -> AgentId {
        match self {
            Self::BusinessGoals => AgentId::BUSINESS_ANALYST,
            Self::DataProfile | Self::PreparationReport => AgentId::DATA_ANALYST,
            Self::FeatureReport => AgentId::DATA_ENGINEER,
            Self::ModelResults => AgentId::MODELER,
            Self::Evaluation => AgentId::EVALUATOR,
            Self::Recommendation => AgentId::BUSINESS_TRANSLATOR,
        }
    }

    /// Human readable title used in reports.
    pub const fn title(self) -> &'static str {
        match self {
            Self::BusinessGoals => "Business goals",
            Self::DataProfile => "Data profile",
            Self::PreparationReport => "Data preparation",
            Self::FeatureReport => "Features",
            Self::ModelResults => "Model results",
            Self::Evaluation => "Evaluation",
            Self::Recommendation => "Recommendation",
        }
    }
}

/// Content of a populated result slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Agent that wrote the record
    pub owner: AgentId,
    /// Free-form structured content
    pub value: Value,
    /// Iteration in which the record was last written
    pub iteration: u32,
    /// Number of times the slot has been written
    pub revision: u32,
}

/// One executor submission, recorded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRecord {
    /// Agent that submitted the code
    pub agent: AgentId,
    /// Submitted code
    pub code: String,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Process exit code, if the process exited
    pub exit_code: Option<i32>,
    /// Whether the run succeeded
    pub success: bool,
    /// Failure reason when the executor itself failed (timeout, crash)
    pub failure: Option<String>,
    /// When the submission finished
    pub timestamp: DateTime<Utc>,
}

/// What the engine will do after the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "agent", rename_all = "snake_case")]
pub enum NextAction {
    /// Run the named agent
    Agent(AgentId),
    /// Stop the workflow
    Terminate,
}

/// A recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Phase before the change
    pub from: Phase,
    /// Phase after the change
    pub to: Phase,
    /// Iteration count at the time of the change
    pub iteration: u32,
}

/// Changes applied by [`SharedState::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Task newly added to `completed_tasks`
    pub newly_completed: Option<TaskId>,
    /// Slot written by the merge
    pub written_slot: Option<ResultSlot>,
    /// Slot write refused because the agent does not own the slot
    pub refused_slot: Option<ResultSlot>,
}

/// Mutable, versioned record threaded through the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    session_id: SessionId,
    request: String,
    dataset: DatasetRef,
    current_phase: Phase,
    completed_tasks: BTreeSet<TaskId>,
    iteration_count: u32,
    next_action: Option<NextAction>,
    results: BTreeMap<ResultSlot, SlotRecord>,
    code_history: Vec<CodeRecord>,
    errors: Vec<String>,
    artifacts: Vec<String>,
    phase_history: Vec<PhaseTransition>,
    version: u64,
}

impl SharedState {
    /// Creates the initial state for a user request.
    pub fn new(request: impl Into<String>, dataset: DatasetRef) -> Self {
        Self::with_session(SessionId::default(), request, dataset)
    }

    /// Creates the initial state under a known session id.
    pub fn with_session(
        session_id: SessionId,
        request: impl Into<String>,
        dataset: DatasetRef,
    ) -> Self {
        Self {
            session_id,
            request: request.into(),
            dataset,
            current_phase: Phase::Start,
            completed_tasks: BTreeSet::new(),
            iteration_count: 0,
            next_action: None,
            results: BTreeMap::new(),
            code_history: Vec::new(),
            errors: Vec::new(),
            artifacts: Vec::new(),
            phase_history: Vec::new(),
            version: 0,
        }
    }

    /// Session identifier, fixed at creation.
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The user's free-text request.
    pub fn request(&self) -> &str {
        &self.request
    }

    /// Dataset the session works on.
    pub const fn dataset(&self) -> &DatasetRef {
        &self.dataset
    }

    /// Active phase.
    pub const fn current_phase(&self) -> Phase {
        self.current_phase
    }

    /// Tasks marked done so far.
    pub const fn completed_tasks(&self) -> &BTreeSet<TaskId> {
        &self.completed_tasks
    }

    /// Whether a task has been completed.
    pub fn is_completed(&self, task: &TaskId) -> bool {
        self.completed_tasks.contains(task)
    }

    /// Number of finished controller cycles.
    pub const fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// Agent dispatched in the last cycle, or the terminal sentinel.
    pub const fn next_action(&self) -> Option<&NextAction> {
        self.next_action.as_ref()
    }

    /// Agent named by `next_action`, if any.
    pub fn last_agent(&self) -> Option<&AgentId> {
        match self.next_action.as_ref() {
            Some(NextAction::Agent(agent)) => Some(agent),
            Some(NextAction::Terminate) | None => None,
        }
    }

    /// Populated result slots.
    pub const fn results(&self) -> &BTreeMap<ResultSlot, SlotRecord> {
        &self.results
    }

    /// Value stored in a slot.
    pub fn result(&self, slot: ResultSlot) -> Option<&Value> {
        self.results.get(&slot).map(|record| &record.value)
    }

    /// Executor submissions in invocation order.
    pub fn code_history(&self) -> &[CodeRecord] {
        &self.code_history
    }

    /// Recorded errors in invocation order.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Files written to the session workspace.
    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }

    /// Phase changes in order.
    pub fn phase_history(&self) -> &[PhaseTransition] {
        &self.phase_history
    }

    /// Mutation counter.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Moves to `phase`, recording the transition when it changes.
    pub fn enter_phase(&mut self, phase: Phase) -> Option<PhaseTransition> {
        if phase == self.current_phase {
            return None;
        }
        let transition = PhaseTransition {
            from: self.current_phase,
            to: phase,
            iteration: self.iteration_count,
        };
        self.current_phase = phase;
        self.phase_history.push(transition.clone());
        self.version += 1;
        Some(transition)
    }

    /// Overwrites `next_action`.
    pub fn set_next_action(&mut self, action: NextAction) {
        self.next_action = Some(action);
        self.version += 1;
    }

    /// Marks a task done. Returns `false` if it already was.
    pub fn mark_completed(&mut self, task: TaskId) -> bool {
        let added = self.completed_tasks.insert(task);
        if added {
            self.version += 1;
        }
        added
    }

    /// Appends an error message.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.version += 1;
    }

    /// Counts one finished controller cycle.
    pub fn increment_iteration(&mut self) {
        self.iteration_count = self.iteration_count.saturating_add(1);
        self.version += 1;
    }

    /// Structurally merges an agent result.
    ///
    /// Code records are appended whatever the outcome. Task completion, slot
    /// output and artifacts are applied only for successful results; a slot
    /// write by an agent that does not own the slot is refused and recorded
    /// as an error. Fields the result does not carry are left untouched.
    pub fn merge(&mut self, agent: &AgentId, result: AgentResult) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let AgentResult {
            success,
            output,
            slot,
            completed_task,
            error,
            code_runs,
            artifacts,
            ..
        } = result;

        self.code_history.extend(code_runs);

        if let Some(message) = error {
            self.errors.push(format!(
                "[iteration {}] {agent}: {message}",
                self.iteration_count
            ));
        }

        if success {
            if let Some(task) = completed_task
                && self.completed_tasks.insert(task.clone())
            {
                outcome.newly_completed = Some(task);
            }

            if let (Some(target), Some(value)) = (slot, output.into_value()) {
                if target.owner() == *agent {
                    self.write_slot(target, agent, value);
                    outcome.written_slot = Some(target);
                } else {
                    self.errors.push(format!(
                        "[iteration {}] {agent}: write to {target:?} refused, slot is owned by {}",
                        self.iteration_count,
                        target.owner()
                    ));
                    outcome.refused_slot = Some(target);
                }
            }

            for artifact in artifacts {
                if !self.artifacts.contains(&artifact) {
                    self.artifacts.push(artifact);
                }
            }
        }

        self.version += 1;
        outcome
    }

    fn write_slot(&mut self, slot: ResultSlot, agent: &AgentId, value: Value) {
        let iteration = self.iteration_count;
        self.results
            .entry(slot)
            .and_modify(|record| {
                record.value = value.clone();
                record.iteration = iteration;
                record.revision += 1;
            })
            .or_insert_with(|| SlotRecord {
                owner: agent.clone(),
                value,
                iteration,
                revision: 1,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::AgentOutput;
    use serde_json::json;

    fn fresh() -> SharedState {
        SharedState::new("profile dataset X", DatasetRef::new("x.csv"))
    }

    fn code_record(agent: AgentId, success: bool) -> CodeRecord {
        CodeRecord {
            agent,
            code: "print(1)".to_owned(),
            stdout: "1\n".to_owned(),
            stderr: String::new(),
            exit_code: Some(i32::from(!success)),
            success,
            failure: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_new_state_starts_empty() {
        let state = fresh();
        assert_eq!(state.current_phase(), Phase::Start);
        assert_eq!(state.iteration_count(), 0);
        assert!(state.completed_tasks().is_empty());
        assert!(state.next_action().is_none());
        assert!(state.results().is_empty());
    }

    #[test]
    fn test_mark_completed_is_idempotent() {
        let mut state = fresh();
        assert!(state.mark_completed(TaskId::DATA_PROFILING));
        assert!(!state.mark_completed(TaskId::DATA_PROFILING));
        assert_eq!(state.completed_tasks().len(), 1);
    }

    #[test]
    fn test_merge_applies_successful_result() {
        let mut state = fresh();
        let result = AgentResult::succeeded(AgentOutput::Structured(json!({"rows": 10})))
            .with_slot(ResultSlot::DataProfile)
            .with_completed_task(TaskId::DATA_PROFILING)
            .with_code_runs(vec![code_record(AgentId::DATA_ANALYST, true)])
            .with_artifacts(vec!["profile.json".to_owned()]);

        let outcome = state.merge(&AgentId::DATA_ANALYST, result);

        assert_eq!(outcome.newly_completed, Some(TaskId::DATA_PROFILING));
        assert_eq!(outcome.written_slot, Some(ResultSlot::DataProfile));
        assert_eq!(state.result(ResultSlot::DataProfile), Some(&json!({"rows": 10})));
        assert_eq!(state.code_history().len(), 1);
        assert_eq!(state.artifacts(), ["profile.json".to_owned()]);
    }

    #[test]
    fn test_merge_failure_keeps_code_and_error_only() {
        let mut state = fresh();
        let mut result = AgentResult::failed("code execution failed")
            .with_slot(ResultSlot::DataProfile)
            .with_completed_task(TaskId::DATA_PROFILING)
            .with_code_runs(vec![code_record(AgentId::DATA_ANALYST, false)]);
        result.output = AgentOutput::Structured(json!({"rows": 1}));

        let outcome = state.merge(&AgentId::DATA_ANALYST, result);

        assert_eq!(outcome, MergeOutcome::default());
        assert!(state.completed_tasks().is_empty());
        assert!(state.results().is_empty());
        assert_eq!(state.code_history().len(), 1);
        assert_eq!(state.errors().len(), 1);
        assert!(state.errors()[0].contains("data_analyst: code execution failed"));
    }

    #[test]
    fn test_merge_refuses_foreign_slot() {
        let mut state = fresh();
        let result = AgentResult::succeeded(AgentOutput::Structured(json!({"accuracy": 0.9})))
            .with_slot(ResultSlot::ModelResults);

        let outcome = state.merge(&AgentId::DATA_ANALYST, result);

        assert_eq!(outcome.refused_slot, Some(ResultSlot::ModelResults));
        assert!(state.result(ResultSlot::ModelResults).is_none());
        assert_eq!(state.errors().len(), 1);
    }

    #[test]
    fn test_merge_does_not_discard_unrelated_fields() {
        let mut state = fresh();
        state.mark_completed(TaskId::DATA_PROFILING);
        state.merge(
            &AgentId::DATA_ANALYST,
            AgentResult::succeeded(AgentOutput::Structured(json!({"rows": 1})))
                .with_slot(ResultSlot::DataProfile),
        );

        state.merge(
            &AgentId::MODELER,
            AgentResult::succeeded(AgentOutput::Structured(json!({"model": "rf"})))
                .with_slot(ResultSlot::ModelResults)
                .with_completed_task(TaskId::MODEL_TRAINING),
        );

        assert!(state.is_completed(&TaskId::DATA_PROFILING));
        assert!(state.is_completed(&TaskId::MODEL_TRAINING));
        assert!(state.result(ResultSlot::DataProfile).is_some());
        assert!(state.result(ResultSlot::ModelResults).is_some());
    }

    #[test]
    fn test_slot_revision_counts_rewrites() {
        let mut state = fresh();
        for rows in [1, 2] {
            state.merge(
                &AgentId::DATA_ANALYST,
                AgentResult::succeeded(AgentOutput::Structured(json!({"rows": rows})))
                    .with_slot(ResultSlot::DataProfile),
            );
        }
        let record = &state.results()[&ResultSlot::DataProfile];
        assert_eq!(record.revision, 2);
        assert_eq!(record.value, json!({"rows": 2}));
    }

    #[test]
    fn test_enter_phase_records_history() {
        let mut state = fresh();
        assert!(state.enter_phase(Phase::Start).is_none());
        let transition = state.enter_phase(Phase::DataUnderstanding).unwrap();
        assert_eq!(transition.from, Phase::Start);
        assert_eq!(state.phase_history().len(), 1);
    }

    #[test]
    fn test_state_json_round_trip() {
        let mut state = fresh();
        state.enter_phase(Phase::DataUnderstanding);
        state.set_next_action(NextAction::Agent(AgentId::DATA_ANALYST));
        state.merge(
            &AgentId::DATA_ANALYST,
            AgentResult::succeeded(AgentOutput::Structured(json!({"rows": 5})))
                .with_slot(ResultSlot::DataProfile)
                .with_completed_task(TaskId::DATA_PROFILING)
                .with_code_runs(vec![code_record(AgentId::DATA_ANALYST, true)]),
        );
        state.increment_iteration();

        let json = serde_json::to_string(&state).unwrap();
        let restored: SharedState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
