use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use datacrew_core::{
    AgentId, AgentOutput, AgentResult, CodeRecord, Context, DispatchNote, ExtractionPolicy,
    ModelProvider, Phase, Query, RoutingRequest, SharedState,
};
use datacrew_tooling::{ExecutionOutput, Executor, ExecutorError, executable_blocks};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::Agent;
use super::role::{Completion, RoleSpec, WorkItem};
use crate::extract::{ExtractError, apply_policy, extract_record, parse_routing};

/// Prefix of stdout lines naming files written by submitted code.
pub const ARTIFACT_MARKER: &str = "ARTIFACT:";

/// How many recent errors are shown to the model.
const RECENT_ERRORS: usize = 3;

/// Agent whose behaviour comes from a [`RoleSpec`] and whose work is done by a model.
pub struct RoleAgent {
    spec: RoleSpec,
    provider: Arc<dyn ModelProvider>,
    executor: Option<Arc<dyn Executor>>,
    policy: ExtractionPolicy,
    llm_timeout: Duration,
}

impl RoleAgent {
    /// Creates an agent for `spec` backed by `provider`.
    pub fn new(spec: RoleSpec, provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            spec,
            provider,
            executor: None,
            policy: ExtractionPolicy::Degrade,
            llm_timeout: Duration::from_secs(120),
        }
    }

    /// Attaches the executor code blocks are submitted to.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the parse-miss policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: ExtractionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bounds each model call.
    #[must_use]
    pub const fn with_llm_timeout(mut self, llm_timeout: Duration) -> Self {
        self.llm_timeout = llm_timeout;
        self
    }

    /// Role configuration.
    pub const fn spec(&self) -> &RoleSpec {
        &self.spec
    }

    /// Read view of the shared state handed to the model.
    fn build_context(&self, state: &SharedState) -> Context {
        let completed = state
            .completed_tasks()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        let mut context = Context::new(self.spec.system_prompt()).with_section(
            "Completed tasks",
            if completed.is_empty() {
                "none".to_owned()
            } else {
                completed.join(", ")
            },
        );

        for (slot, record) in state.results() {
            let body = serde_json::to_string_pretty(&record.value)
                .unwrap_or_else(|_| record.value.to_string());
            context = context.with_section(slot.title(), body);
        }

        let errors = state.errors();
        if !errors.is_empty() {
            let recent = errors
                .iter()
                .skip(errors.len().saturating_sub(RECENT_ERRORS))
                .map(|error| format!("- {error}"))
                .collect::<Vec<_>>()
                .join("\n");
            context = context.with_section("Recent errors", recent);
        }
        context
    }

    /// Last failed submission of this agent, shown so the model can fix it.
    fn previous_failure<'state>(&self, state: &'state SharedState) -> Option<&'state CodeRecord> {
        state
            .code_history()
            .iter()
            .rev()
            .find(|record| record.agent == self.spec.id)
            .filter(|record| !record.success)
    }

    async fn call_model(
        &self,
        state: &SharedState,
        note: Option<&DispatchNote>,
    ) -> Result<String, String> {
        let query =
            Query::new(self.build_task(state, note)).with_session(state.session_id().to_string());
        let context = self.build_context(state);

        let response = timeout(self.llm_timeout, self.provider.generate(&query, &context))
            .await
            .map_err(|_elapsed| {
                format!(
                    "model call timed out after {}s",
                    self.llm_timeout.as_secs_f64()
                )
            })?
            .map_err(|error| format!("model call failed: {error}"))?;

        debug!(
            "{} received {} chars from {} in {}ms",
            self.spec.id,
            response.text.len(),
            response.provider,
            response.latency_ms
        );

        if response.text.trim().is_empty() {
            return Err("model returned an empty response".to_owned());
        }
        Ok(response.text)
    }

    /// Runs the reply's code blocks in order, stopping at the first failure.
    async fn run_code(&self, reply: &str) -> (Vec<CodeRecord>, Option<String>) {
        let mut records = Vec::new();
        for code in executable_blocks(reply) {
            let outcome = match &self.executor {
                Some(executor) => executor.run(&code).await,
                None => Err(ExecutorError::Spawn("no executor configured".to_owned())),
            };
            let record = self.code_record(code, outcome);
            let failure = (!record.success).then(|| {
                record.failure.clone().unwrap_or_else(|| {
                    format!(
                        "code exited with {}: {}",
                        record
                            .exit_code
                            .map_or_else(|| "a signal".to_owned(), |code| code.to_string()),
                        last_line(&record.stderr)
                    )
                })
            });
            records.push(record);
            if let Some(failure) = failure {
                return (records, Some(failure));
            }
        }
        (records, None)
    }

    fn code_record(
        &self,
        code: String,
        outcome: Result<ExecutionOutput, ExecutorError>,
    ) -> CodeRecord {
        let (output, failure) = match outcome {
            Ok(output) => (output, None),
            Err(error) => (ExecutionOutput::default(), Some(error.to_string())),
        };
        CodeRecord {
            agent: self.spec.id.clone(),
            code,
            success: output.success && failure.is_none(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            failure,
            timestamp: Utc::now(),
        }
    }

    /// Applies the work item's completion rule to an extracted record.
    fn finish(
        item: &WorkItem,
        record: Value,
        explicit: Option<RoutingRequest>,
    ) -> AgentResult {
        let approved = record.get("approved").and_then(Value::as_bool);
        let reason = record
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("evaluation rejected the model")
            .to_owned();
        let base = AgentResult::succeeded(AgentOutput::Structured(record)).with_slot(item.slot);

        let completes = match item.completion {
            Completion::Always => true,
            Completion::OnApproval { .. } => approved == Some(true),
        };
        if completes {
            return base
                .with_completed_task(item.task.clone())
                .with_request(explicit);
        }

        let request = match (&item.completion, approved) {
            (Completion::OnApproval { on_rejection }, Some(false)) => {
                Some(explicit.unwrap_or_else(|| RoutingRequest::LoopBack {
                    agent: on_rejection.clone(),
                    reason,
                }))
            }
            _ => explicit,
        };
        base.with_request(request)
    }
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
}

fn artifacts_in(records: &[CodeRecord], reply: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let lines = records
        .iter()
        .flat_map(|record| record.stdout.lines())
        .chain(reply.lines());
    for line in lines {
        if let Some(name) = line.trim().strip_prefix(ARTIFACT_MARKER) {
            let name = name.trim().to_owned();
            if !name.is_empty() && !found.contains(&name) {
                found.push(name);
            }
        }
    }
    found
}

#[async_trait]
impl Agent for RoleAgent {
    fn id(&self) -> &AgentId {
        &self.spec.id
    }

    fn should_execute(&self, state: &SharedState) -> bool {
        self.spec.work_for(state.current_phase()).is_some()
    }

    fn build_task(&self, state: &SharedState, note: Option<&DispatchNote>) -> String {
        let phase = state.current_phase();
        let mut task = format!(
            "Agent: {}\nPhase: {}\nRequest: {}\nDataset: {}\n\n",
            self.spec.id,
            phase,
            state.request(),
            state.dataset()
        );
        if let Some(item) = self.spec.work_for(phase) {
            task.push_str(&item.instructions);
        }
        match note {
            Some(DispatchNote::Revision { from, reason }) => {
                let _ignored = write!(
                    task,
                    "\n\nRevision requested from the {from} phase: {reason}\nRevise your earlier result accordingly."
                );
            }
            Some(DispatchNote::Correction { reason }) => {
                let _ignored = write!(
                    task,
                    "\n\nYour previous routing request was refused: {reason}\nFinish the work of the {phase} phase first."
                );
            }
            None => {}
        }
        if let Some(failed) = self.previous_failure(state) {
            let detail = failed
                .failure
                .clone()
                .unwrap_or_else(|| last_line(&failed.stderr).to_owned());
            let _ignored = write!(
                task,
                "\n\nYour previous code failed ({detail}):\n```python\n{}\n```\nFix it.",
                failed.code
            );
        }
        task
    }

    fn extract(&self, phase: Phase, output: &str) -> Result<Value, ExtractError> {
        let Some(item) = self.spec.work_for(phase) else {
            return Err(ExtractError::NoStructure);
        };
        extract_record(output, item.scrape)
    }

    async fn run(&self, state: &SharedState, note: Option<&DispatchNote>) -> AgentResult {
        let phase = state.current_phase();
        let Some(item) = self.spec.work_for(phase) else {
            return AgentResult::failed(format!("{} has no work in phase {phase}", self.spec.id));
        };

        let reply = match self.call_model(state, note).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!("{} model call failed: {}", self.spec.id, error);
                return AgentResult::failed(error);
            }
        };

        let (code_runs, code_failure) = if item.expects_code {
            self.run_code(&reply).await
        } else {
            (Vec::new(), None)
        };
        if let Some(failure) = code_failure {
            return AgentResult::failed(format!("code execution failed: {failure}"))
                .with_code_runs(code_runs);
        }

        let mut scraped = reply.clone();
        for record in &code_runs {
            scraped.push('\n');
            scraped.push_str(&record.stdout);
        }

        let artifacts = artifacts_in(&code_runs, &reply);
        let request = parse_routing(&reply);
        let record = match apply_policy(self.extract(phase, &scraped), &reply, self.policy) {
            Ok(record) => record,
            Err(error) => {
                return AgentResult::failed(format!(
                    "could not extract {}: {error}",
                    item.slot.title().to_lowercase()
                ))
                .with_code_runs(code_runs);
            }
        };

        Self::finish(item, record, request)
            .with_code_runs(code_runs)
            .with_artifacts(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacrew_core::{DatasetRef, NextAction, TaskId};
    use datacrew_providers::{MockProvider, MockReply};
    use datacrew_tooling::{ScriptedExecutor, ScriptedRun};
    use serde_json::json;

    fn state_in(phase: Phase) -> SharedState {
        let mut state = SharedState::new("predict churn", DatasetRef::new("churn.csv"));
        state.enter_phase(phase);
        state
    }

    fn agent(spec: RoleSpec, provider: MockProvider) -> RoleAgent {
        RoleAgent::new(spec, Arc::new(provider))
    }

    #[tokio::test]
    async fn test_profile_with_code_and_json() {
        let provider = MockProvider::new().with_default_response(
            "```python\nprint('rows: 150')\n```\n```json\n{\"rows\": 150}\n```",
        );
        let executor = ScriptedExecutor::succeeding("rows: 150\nARTIFACT: profile.html\n");
        let data_analyst = agent(RoleSpec::data_analyst(), provider)
            .with_executor(Arc::new(executor.clone()));

        let result = data_analyst
            .run(&state_in(Phase::DataUnderstanding), None)
            .await;

        assert!(result.success);
        assert_eq!(result.completed_task, Some(TaskId::DATA_PROFILING));
        assert_eq!(result.output, AgentOutput::Structured(json!({"rows": 150})));
        assert_eq!(result.code_runs.len(), 1);
        assert_eq!(result.code_runs[0].code, "print('rows: 150')");
        assert_eq!(result.artifacts, vec!["profile.html"]);
        assert_eq!(executor.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_code_failure_fails_result_and_keeps_record() {
        let provider = MockProvider::new().with_default_response("```python\nraise KeyError\n```");
        let executor = ScriptedExecutor::new([ScriptedRun::Output(
            ExecutionOutput::runtime_error("Traceback\nKeyError: 'churn'", 1),
        )]);
        let modeler = agent(RoleSpec::modeler(), provider).with_executor(Arc::new(executor));

        let result = modeler.run(&state_in(Phase::Modeling), None).await;

        assert!(!result.success);
        assert_eq!(result.code_runs.len(), 1);
        assert!(!result.code_runs[0].success);
        assert!(result.error.unwrap().contains("KeyError: 'churn'"));
        assert_eq!(result.completed_task, None);
    }

    #[tokio::test]
    async fn test_executor_timeout_is_recorded_as_failure() {
        let provider = MockProvider::new().with_default_response("```python\nwhile True: pass\n```");
        let executor = ScriptedExecutor::new([ScriptedRun::Timeout]);
        let engineer = agent(RoleSpec::data_engineer(), provider).with_executor(Arc::new(executor));

        let result = engineer.run(&state_in(Phase::FeatureEngineering), None).await;

        assert!(!result.success);
        assert!(
            result.code_runs[0]
                .failure
                .as_deref()
                .unwrap()
                .contains("timed out")
        );
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failed_result() {
        let provider = MockProvider::new()
            .with_response("Phase: modeling", MockReply::Fail("rate limited".to_owned()));
        let result = agent(RoleSpec::modeler(), provider)
            .run(&state_in(Phase::Modeling), None)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_failure() {
        let provider = MockProvider::new().with_default_response("   \n");
        let result = agent(RoleSpec::business_translator(), provider)
            .run(&state_in(Phase::BusinessTranslation), None)
            .await;
        assert_eq!(result.error.as_deref(), Some("model returned an empty response"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_is_failure() {
        let provider = MockProvider::new().with_default_response("unused").with_response(
            "Agent: modeler",
            MockReply::Delayed(Duration::from_secs(300), "too late".to_owned()),
        );
        let result = agent(RoleSpec::modeler(), provider)
            .with_llm_timeout(Duration::from_secs(5))
            .run(&state_in(Phase::Modeling), None)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_parse_miss_degrades_or_fails() {
        let prose = "The data looks reasonable.";
        let degraded = agent(
            RoleSpec::business_translator(),
            MockProvider::new().with_default_response(prose),
        )
        .run(&state_in(Phase::BusinessTranslation), None)
        .await;
        assert!(degraded.success);
        let AgentOutput::Structured(record) = &degraded.output else {
            panic!("expected structured output");
        };
        assert_eq!(record["fallback"], json!(true));

        let failed = agent(
            RoleSpec::business_translator(),
            MockProvider::new().with_default_response(prose),
        )
        .with_policy(ExtractionPolicy::Fail)
        .run(&state_in(Phase::BusinessTranslation), None)
        .await;
        assert!(!failed.success);
        assert!(failed.error.unwrap().starts_with("could not extract recommendation"));
    }

    #[tokio::test]
    async fn test_evaluator_rejection_loops_back_to_modeler() {
        let provider = MockProvider::new()
            .with_default_response("VERDICT: REJECTED\nReason: recall 0.41 is below 0.7");
        let result = agent(RoleSpec::evaluator(), provider)
            .run(&state_in(Phase::Evaluation), None)
            .await;

        assert!(result.success);
        assert_eq!(result.completed_task, None);
        assert_eq!(
            result.requested_next,
            Some(RoutingRequest::LoopBack {
                agent: AgentId::MODELER,
                reason: "recall 0.41 is below 0.7".to_owned(),
            })
        );
    }

    #[tokio::test]
    async fn test_evaluator_explicit_route_wins() {
        let provider = MockProvider::new().with_default_response(
            "VERDICT: REJECTED\nROUTE: LOOP_BACK business_analyst REASON: goals are unrealistic",
        );
        let result = agent(RoleSpec::evaluator(), provider)
            .run(&state_in(Phase::Evaluation), None)
            .await;
        assert_eq!(
            result.requested_next.and_then(|request| request.target().cloned()),
            Some(AgentId::BUSINESS_ANALYST)
        );
    }

    #[tokio::test]
    async fn test_evaluator_approval_completes() {
        let provider = MockProvider::new().with_default_response("VERDICT: APPROVED\nf1: 0.81");
        let result = agent(RoleSpec::evaluator(), provider)
            .run(&state_in(Phase::Evaluation), None)
            .await;
        assert_eq!(result.completed_task, Some(TaskId::MODEL_EVALUATION));
        assert_eq!(result.requested_next, None);
    }

    #[test]
    fn test_task_mentions_notes_and_previous_failure() {
        let modeler = agent(RoleSpec::modeler(), MockProvider::new());
        let mut state = state_in(Phase::Modeling);
        state.set_next_action(NextAction::Agent(AgentId::MODELER));
        state.merge(
            &AgentId::MODELER,
            AgentResult::failed("code execution failed").with_code_runs(vec![CodeRecord {
                agent: AgentId::MODELER,
                code: "fit()".to_owned(),
                stdout: String::new(),
                stderr: "NameError: fit".to_owned(),
                exit_code: Some(1),
                success: false,
                failure: None,
                timestamp: Utc::now(),
            }]),
        );

        let note = DispatchNote::Revision {
            from: Phase::Evaluation,
            reason: "overfitting".to_owned(),
        };
        let task = modeler.build_task(&state, Some(&note));

        assert!(task.starts_with("Agent: modeler\nPhase: modeling\n"));
        assert!(task.contains("Revision requested from the evaluation phase: overfitting"));
        assert!(task.contains("Your previous code failed (NameError: fit)"));
        assert!(task.contains("fit()"));
    }

    #[test]
    fn test_should_execute_follows_work_items() {
        let analyst = agent(RoleSpec::data_analyst(), MockProvider::new());
        assert!(analyst.should_execute(&state_in(Phase::DataPreparation)));
        assert!(!analyst.should_execute(&state_in(Phase::Evaluation)));
    }
}
