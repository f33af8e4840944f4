//! Role catalogue: one value per built-in agent instead of a class per role.

use datacrew_core::{AgentId, Phase, ResultSlot, TaskId};
use serde::{Deserialize, Serialize};

use crate::extract::ScrapeKind;

/// Output conventions appended to every role prompt.
pub const OUTPUT_PROTOCOL: &str = "\
Answer in markdown. Put your structured result in a single ```json block.
Put Python code to run in ```python blocks; it is executed in order and its output is recorded.
To influence routing, end with one line:
ROUTE: HANDOFF <agent>
ROUTE: LOOP_BACK <agent> REASON: <why>
ROUTE: COMPLETE
Agents: business_analyst, data_analyst, data_engineer, modeler, evaluator, business_translator.";

/// When a successful invocation completes its task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Completion {
    /// Every successful invocation completes the task
    Always,
    /// Only an approving verdict completes the task; an explicit rejection
    /// without its own route loops back to `on_rejection`
    OnApproval {
        /// Agent asked to revise after a rejection
        on_rejection: AgentId,
    },
}

/// What a role does in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Phase the item belongs to
    pub phase: Phase,
    /// Task completed by the item
    pub task: TaskId,
    /// Slot the extracted record is written to
    pub slot: ResultSlot,
    /// Instructions handed to the model
    pub instructions: String,
    /// Whether code blocks in the reply are executed
    pub expects_code: bool,
    /// Markers scraped when the reply has no JSON block
    pub scrape: ScrapeKind,
    /// Completion rule
    pub completion: Completion,
}

impl WorkItem {
    fn new(
        phase: Phase,
        task: TaskId,
        slot: ResultSlot,
        scrape: ScrapeKind,
        instructions: &str,
    ) -> Self {
        Self {
            phase,
            task,
            slot,
            instructions: instructions.to_owned(),
            expects_code: false,
            scrape,
            completion: Completion::Always,
        }
    }

    const fn with_code(mut self) -> Self {
        self.expects_code = true;
        self
    }
}

/// Configuration of one agent role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    /// Agent identifier
    pub id: AgentId,
    /// Role description used as system prompt
    pub role_prompt: String,
    /// Per-phase work items
    pub work: Vec<WorkItem>,
}

impl RoleSpec {
    /// Work item for `phase`.
    pub fn work_for(&self, phase: Phase) -> Option<&WorkItem> {
        self.work.iter().find(|item| item.phase == phase)
    }

    /// System prompt: role description followed by the output conventions.
    pub fn system_prompt(&self) -> String {
        format!("{}\n\n{OUTPUT_PROTOCOL}", self.role_prompt)
    }

    /// Turns the request into goals and success criteria.
    pub fn business_analyst() -> Self {
        Self {
            id: AgentId::BUSINESS_ANALYST,
            role_prompt: "You are the business analyst of a data science team. You turn a \
                          request into measurable goals and success criteria."
                .to_owned(),
            work: vec![WorkItem::new(
                Phase::BusinessUnderstanding,
                TaskId::BUSINESS_GOALS,
                ResultSlot::BusinessGoals,
                ScrapeKind::Goals,
                "Define the business objective, the target variable and measurable success \
                 criteria. Return them as JSON with `goals` and `success_criteria` lists.",
            )],
        }
    }

    /// Profiles, then prepares the dataset.
    pub fn data_analyst() -> Self {
        Self {
            id: AgentId::DATA_ANALYST,
            role_prompt: "You are the data analyst of a data science team. You profile \
                          datasets and prepare them for modelling using Python and pandas."
                .to_owned(),
            work: vec![
                WorkItem::new(
                    Phase::DataUnderstanding,
                    TaskId::DATA_PROFILING,
                    ResultSlot::DataProfile,
                    ScrapeKind::Profile,
                    "Profile the dataset: shape, column types, missing values, distributions \
                     and a data quality score from 0 to 10. Report the numbers you computed.",
                )
                .with_code(),
                WorkItem::new(
                    Phase::DataPreparation,
                    TaskId::DATA_PREPROCESSING,
                    ResultSlot::PreparationReport,
                    ScrapeKind::Steps,
                    "Clean and preprocess the dataset based on the profile. List every step \
                     you applied and save the prepared data next to the original.",
                )
                .with_code(),
            ],
        }
    }

    /// Derives model features.
    pub fn data_engineer() -> Self {
        Self {
            id: AgentId::DATA_ENGINEER,
            role_prompt: "You are the data engineer of a data science team. You derive and \
                          select features from prepared data."
                .to_owned(),
            work: vec![
                WorkItem::new(
                    Phase::FeatureEngineering,
                    TaskId::FEATURE_ENGINEERING,
                    ResultSlot::FeatureReport,
                    ScrapeKind::Features,
                    "Engineer features for the modelling goal. List each feature with how it \
                     is derived. If the prepared data is unusable, loop back to the data analyst.",
                )
                .with_code(),
            ],
        }
    }

    /// Trains candidate models.
    pub fn modeler() -> Self {
        Self {
            id: AgentId::MODELER,
            role_prompt: "You are the modeler of a data science team. You train and compare \
                          candidate models with scikit-learn."
                .to_owned(),
            work: vec![
                WorkItem::new(
                    Phase::Modeling,
                    TaskId::MODEL_TRAINING,
                    ResultSlot::ModelResults,
                    ScrapeKind::Metrics,
                    "Train candidate models on the engineered features and report validation \
                     metrics as `name: value` lines or JSON, including the chosen model.",
                )
                .with_code(),
            ],
        }
    }

    /// Judges model results against the goals.
    pub fn evaluator() -> Self {
        Self {
            id: AgentId::EVALUATOR,
            role_prompt: "You are the evaluator of a data science team. You judge whether \
                          model results meet the success criteria."
                .to_owned(),
            work: vec![WorkItem {
                completion: Completion::OnApproval {
                    on_rejection: AgentId::MODELER,
                },
                ..WorkItem::new(
                    Phase::Evaluation,
                    TaskId::MODEL_EVALUATION,
                    ResultSlot::Evaluation,
                    ScrapeKind::Verdict,
                    "Evaluate the model results against the goals. State `VERDICT: APPROVED` or \
                     `VERDICT: REJECTED` with a `Reason:` line. To revise goals or features \
                     instead of the model, loop back to the business analyst or data engineer.",
                )
            }],
        }
    }

    /// Writes the final recommendation.
    pub fn business_translator() -> Self {
        Self {
            id: AgentId::BUSINESS_TRANSLATOR,
            role_prompt: "You are the business translator of a data science team. You explain \
                          results to non-technical stakeholders."
                .to_owned(),
            work: vec![WorkItem::new(
                Phase::BusinessTranslation,
                TaskId::BUSINESS_TRANSLATION,
                ResultSlot::Recommendation,
                ScrapeKind::Recommendation,
                "Summarise what was found and recommend concrete next steps in plain language. \
                 Start with a one-paragraph summary followed by a bulleted list.",
            )],
        }
    }

    /// All six built-in roles in pipeline order.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::business_analyst(),
            Self::data_analyst(),
            Self::data_engineer(),
            Self::modeler(),
            Self::evaluator(),
            Self::business_translator(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_slot_is_owned_by_its_role() {
        for role in RoleSpec::builtin() {
            for item in &role.work {
                assert_eq!(item.slot.owner(), role.id, "{:?}", item.slot);
            }
        }
    }

    #[test]
    fn test_data_analyst_has_two_phases() {
        let role = RoleSpec::data_analyst();
        assert!(role.work_for(Phase::DataUnderstanding).is_some());
        assert!(role.work_for(Phase::DataPreparation).is_some());
        assert!(role.work_for(Phase::Modeling).is_none());
    }

    #[test]
    fn test_system_prompt_carries_protocol() {
        let prompt = RoleSpec::evaluator().system_prompt();
        assert!(prompt.starts_with("You are the evaluator"));
        assert!(prompt.contains("ROUTE: LOOP_BACK"));
    }
}
