//! Phase model: required tasks, owners, successors and permitted loops.

use std::collections::BTreeSet;

use datacrew_core::{AgentId, Phase, TaskId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutingError};

/// One row of the phase table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Phase this row describes
    pub phase: Phase,
    /// Tasks that must be complete before the phase is satisfied
    pub required_tasks: Vec<TaskId>,
    /// Agent dispatched while the phase is active
    pub owner: Option<AgentId>,
    /// Phase entered once this one is satisfied; `None` for terminal phases
    pub successor: Option<Phase>,
}

impl PhaseSpec {
    /// Row owned by `owner` requiring `task`.
    pub fn owned(phase: Phase, task: TaskId, owner: AgentId, successor: Phase) -> Self {
        Self {
            phase,
            required_tasks: vec![task],
            owner: Some(owner),
            successor: Some(successor),
        }
    }

    /// Row without work that simply leads to `successor`.
    pub const fn passthrough(phase: Phase, successor: Phase) -> Self {
        Self {
            phase,
            required_tasks: Vec::new(),
            owner: None,
            successor: Some(successor),
        }
    }

    /// Terminal row.
    pub const fn terminal(phase: Phase) -> Self {
        Self {
            phase,
            required_tasks: Vec::new(),
            owner: None,
            successor: None,
        }
    }
}

/// Validated phase model consulted by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTable {
    phases: Vec<PhaseSpec>,
    loops: BTreeSet<(Phase, Phase)>,
}

impl PhaseTable {
    /// Validates and builds a table.
    ///
    /// # Errors
    /// Returns a [`RoutingError`] when a phase is declared twice, a reference
    /// points at an undeclared phase, a working phase has no owner, or the
    /// forward path from `start` does not end in a terminal phase.
    pub fn new(
        phases: Vec<PhaseSpec>,
        loops: impl IntoIterator<Item = (Phase, Phase)>,
    ) -> Result<Self> {
        let table = Self {
            phases,
            loops: loops.into_iter().collect(),
        };
        table.validate()?;
        Ok(table)
    }

    /// The data-science pipeline used by default.
    ///
    /// `business_understanding` sits off the forward path and is reached only
    /// through the evaluator's goal-revision loop.
    pub fn standard() -> Self {
        Self {
            phases: vec![
                PhaseSpec::passthrough(Phase::Start, Phase::DataUnderstanding),
                PhaseSpec::owned(
                    Phase::BusinessUnderstanding,
                    TaskId::BUSINESS_GOALS,
                    AgentId::BUSINESS_ANALYST,
                    Phase::DataUnderstanding,
                ),
                PhaseSpec::owned(
                    Phase::DataUnderstanding,
                    TaskId::DATA_PROFILING,
                    AgentId::DATA_ANALYST,
                    Phase::DataPreparation,
                ),
                PhaseSpec::owned(
                    Phase::DataPreparation,
                    TaskId::DATA_PREPROCESSING,
                    AgentId::DATA_ANALYST,
                    Phase::FeatureEngineering,
                ),
                PhaseSpec::owned(
                    Phase::FeatureEngineering,
                    TaskId::FEATURE_ENGINEERING,
                    AgentId::DATA_ENGINEER,
                    Phase::Modeling,
                ),
                PhaseSpec::owned(
                    Phase::Modeling,
                    TaskId::MODEL_TRAINING,
                    AgentId::MODELER,
                    Phase::Evaluation,
                ),
                PhaseSpec::owned(
                    Phase::Evaluation,
                    TaskId::MODEL_EVALUATION,
                    AgentId::EVALUATOR,
                    Phase::BusinessTranslation,
                ),
                PhaseSpec::owned(
                    Phase::BusinessTranslation,
                    TaskId::BUSINESS_TRANSLATION,
                    AgentId::BUSINESS_TRANSLATOR,
                    Phase::Completed,
                ),
                PhaseSpec::terminal(Phase::Completed),
            ],
            loops: [
                (Phase::Evaluation, Phase::BusinessUnderstanding),
                (Phase::Evaluation, Phase::Modeling),
                (Phase::Evaluation, Phase::FeatureEngineering),
                (Phase::Modeling, Phase::DataPreparation),
                (Phase::FeatureEngineering, Phase::DataPreparation),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for spec in &self.phases {
            if !seen.insert(spec.phase) {
                return Err(RoutingError::DuplicatePhase(spec.phase));
            }
        }
        if !seen.contains(&Phase::Start) {
            return Err(RoutingError::MissingStart);
        }
        for spec in &self.phases {
            if let Some(successor) = spec.successor
                && !seen.contains(&successor)
            {
                return Err(RoutingError::UnknownPhase(successor));
            }
            if !spec.required_tasks.is_empty() && spec.owner.is_none() {
                return Err(RoutingError::MissingOwner(spec.phase));
            }
        }
        for (from, to) in &self.loops {
            for phase in [from, to] {
                if !seen.contains(phase) {
                    return Err(RoutingError::UnknownPhase(*phase));
                }
            }
        }

        let mut current = Phase::Start;
        let mut visited = BTreeSet::new();
        while let Some(successor) = self.spec(current).and_then(|spec| spec.successor) {
            if !visited.insert(current) {
                return Err(RoutingError::UnterminatedPath(current));
            }
            current = successor;
        }
        Ok(())
    }

    /// Row for `phase`.
    pub fn spec(&self, phase: Phase) -> Option<&PhaseSpec> {
        self.phases.iter().find(|spec| spec.phase == phase)
    }

    /// All rows in table order.
    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    /// Agent dispatched while `phase` is active.
    pub fn owner(&self, phase: Phase) -> Option<&AgentId> {
        self.spec(phase).and_then(|spec| spec.owner.as_ref())
    }

    /// Successor of `phase`.
    pub fn successor(&self, phase: Phase) -> Option<Phase> {
        self.spec(phase).and_then(|spec| spec.successor)
    }

    /// First phase in table order owned by `agent`.
    pub fn home_phase(&self, agent: &AgentId) -> Option<Phase> {
        self.phases
            .iter()
            .find(|spec| spec.owner.as_ref() == Some(agent))
            .map(|spec| spec.phase)
    }

    /// Phases owned by `agent`, in table order.
    pub fn owned_phases(&self, agent: &AgentId) -> Vec<Phase> {
        self.phases
            .iter()
            .filter(|spec| spec.owner.as_ref() == Some(agent))
            .map(|spec| spec.phase)
            .collect()
    }

    /// Phase a request naming `agent` resolves to when issued from `current`.
    ///
    /// An agent owning several phases is resolved against the pair being
    /// checked: the current phase first, then an allow-listed loop target,
    /// then the nearest phase ahead on the successor chain, and finally the
    /// agent's home phase.
    pub fn request_target(&self, current: Phase, agent: &AgentId) -> Option<Phase> {
        let owned = self.owned_phases(agent);
        if owned.contains(&current) {
            return Some(current);
        }
        owned
            .iter()
            .copied()
            .find(|phase| self.allows_loop(current, *phase))
            .or_else(|| {
                owned
                    .iter()
                    .copied()
                    .filter_map(|phase| {
                        self.phases_between(current, phase)
                            .map(|skipped| (skipped.len(), phase))
                    })
                    .min_by_key(|(distance, _)| *distance)
                    .map(|(_, phase)| phase)
            })
            .or_else(|| owned.first().copied())
    }

    /// Whether some phase is owned by `agent`.
    pub fn is_known_agent(&self, agent: &AgentId) -> bool {
        self.home_phase(agent).is_some()
    }

    /// Whether every required task of `phase` is in `completed`.
    ///
    /// Undeclared phases are never satisfied.
    pub fn is_satisfied(&self, phase: Phase, completed: &BTreeSet<TaskId>) -> bool {
        self.spec(phase).is_some_and(|spec| {
            spec.required_tasks
                .iter()
                .all(|task| completed.contains(task))
        })
    }

    /// Whether the loop `from -> to` is allow-listed.
    pub fn allows_loop(&self, from: Phase, to: Phase) -> bool {
        self.loops.contains(&(from, to))
    }

    /// Permitted loops.
    pub const fn loops(&self) -> &BTreeSet<(Phase, Phase)> {
        &self.loops
    }

    /// Phases visited by following successors from `start`, terminal phase included.
    pub fn forward_path(&self) -> Vec<Phase> {
        self.successor_chain(Phase::Start)
    }

    /// Phases from `from` (inclusive) to the terminal phase.
    fn successor_chain(&self, from: Phase) -> Vec<Phase> {
        let mut chain = vec![from];
        let mut current = from;
        while let Some(next) = self.successor(current) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Tasks a run must complete: those of the forward path, in order.
    pub fn required_tasks(&self) -> Vec<TaskId> {
        let mut tasks = Vec::new();
        for phase in self.forward_path() {
            if let Some(spec) = self.spec(phase) {
                for task in &spec.required_tasks {
                    if !tasks.contains(task) {
                        tasks.push(task.clone());
                    }
                }
            }
        }
        tasks
    }

    /// Last working phase of the forward path (the one leading into the terminal phase).
    pub fn final_phase(&self) -> Option<Phase> {
        self.forward_path()
            .into_iter()
            .rev()
            .find(|phase| self.successor(*phase).is_some())
    }

    /// Phases that must be satisfied to move forward from `from` to `to`.
    ///
    /// Returns `None` when `to` is not reachable from `from` by successors.
    pub fn phases_between(&self, from: Phase, to: Phase) -> Option<Vec<Phase>> {
        let chain = self.successor_chain(from);
        let position = chain.iter().position(|phase| *phase == to)?;
        Some(chain.into_iter().take(position).collect())
    }
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self::standard()
    }
}
