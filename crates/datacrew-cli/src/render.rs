//! Terminal rendering of workflow events and the final report.

use console::style;
use datacrew_agent::FinalReport;
use datacrew_core::{DispatchNote, WorkflowEvent};

/// One progress line per event.
pub fn event_line(event: &WorkflowEvent) -> String {
    match event {
        WorkflowEvent::Started {
            session_id,
            request,
        } => format!(
            "{} {request} {}",
            style("Starting").cyan().bold(),
            style(format!("(session {session_id})")).dim()
        ),
        WorkflowEvent::PhaseChanged { from, to } => {
            format!("{} {from} -> {to}", style("Phase").cyan())
        }
        WorkflowEvent::Dispatched {
            iteration,
            agent,
            phase,
            note,
        } => {
            let suffix = match note {
                Some(DispatchNote::Revision { from, reason }) => {
                    format!(" (revision from {from}: {reason})")
                }
                Some(DispatchNote::Correction { reason }) => format!(" (correction: {reason})"),
                None => String::new(),
            };
            format!(
                "{} {agent} in {phase}{}",
                style(format!("[{iteration:>2}]")).dim(),
                style(suffix).dim()
            )
        }
        WorkflowEvent::AgentFinished {
            iteration,
            agent,
            success,
            completed_task,
            error,
        } => {
            let detail = match (success, completed_task, error) {
                (true, Some(task), _) => style(format!("completed {task}")).green(),
                (true, None, _) => style("done".to_owned()).green(),
                (false, _, Some(error)) => style(format!("failed: {error}")).yellow(),
                (false, _, None) => style("failed".to_owned()).yellow(),
            };
            format!("{} {agent} {detail}", style(format!("[{iteration:>2}]")).dim())
        }
        WorkflowEvent::RoutingRejected { agent, reason } => format!(
            "{} request from {agent}: {reason}",
            style("Rejected").yellow().bold()
        ),
        WorkflowEvent::Finished { success, outcome } => {
            if *success {
                format!("{} {outcome}", style("Finished").green().bold())
            } else {
                format!("{} {outcome}", style("Stopped").red().bold())
            }
        }
    }
}

/// Report block printed after the run.
pub fn report_text(report: &FinalReport) -> String {
    let mut lines = Vec::new();
    let headline = if report.success {
        style("Workflow succeeded".to_owned()).green().bold()
    } else {
        style(format!("Workflow did not succeed: {}", report.outcome))
            .red()
            .bold()
    };
    lines.push(headline.to_string());
    lines.push(String::new());
    lines.extend(report.summary.lines().map(ToOwned::to_owned));

    if !report.remaining_tasks.is_empty() {
        let remaining = report
            .remaining_tasks
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(String::new());
        lines.push(format!("{} {remaining}", style("Remaining tasks:").yellow()));
    }
    if !report.artifacts.is_empty() {
        lines.push(format!(
            "{} {}",
            style("Artifacts:").cyan(),
            report.artifacts.join(", ")
        ));
    }
    lines.join("\n")
}
