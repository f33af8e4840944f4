//! Command handlers for CLI operations

use anyhow::{Context as _, Result, bail};
use console::{Term, style};
use datacrew_agent::{FileWorkspace, WorkflowEngine, builtin_agents};
use datacrew_core::{
    DatacrewConfig, DatasetRef, EventChannel, ExtractionPolicy, ModelProvider, ProviderKind,
    SharedState, WorkflowEvent,
};
use datacrew_providers::{MockProvider, OllamaProvider, OpenRouterProvider};
use datacrew_tooling::{Executor, ProcessExecutor, RestartingExecutor};
use serde::Deserialize;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing_subscriber::{
    EnvFilter, Registry, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use crate::cli::RunArgs;
use crate::render::{event_line, report_text};

const DEFAULT_LOG_FILTER: &str = "datacrew_agent=info,datacrew_routing=info,datacrew_tooling=info";

/// Scripted replies for the mock provider.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MockScript {
    /// Reply for queries no entry matches
    default: Option<String>,
    /// Entries tried in order
    replies: Vec<MockEntry>,
}

#[derive(Debug, Deserialize)]
struct MockEntry {
    /// Substring of the task or role prompt
    pattern: String,
    /// Successive replies; the last one repeats
    replies: Vec<String>,
}

/// Sends logs to `log_file`, or to stderr when none is given.
///
/// # Errors
/// Returns an error if the log file cannot be opened
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
    }
    Ok(())
}

/// Loads the given config file, or the default one (created on first use).
fn load_config(path: Option<&Path>) -> Result<(DatacrewConfig, PathBuf)> {
    if let Some(path) = path {
        let config = DatacrewConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        return Ok((config, path.to_path_buf()));
    }

    let default_path = DatacrewConfig::config_path()?;
    let config = DatacrewConfig::load_or_create().unwrap_or_else(|error| {
        tracing::warn!("Failed to load config from {}: {error}", default_path.display());
        tracing::warn!("Using default configuration");
        DatacrewConfig::default()
    });
    Ok((config, default_path))
}

/// Applies command-line overrides on top of the loaded config.
fn apply_overrides(config: &mut DatacrewConfig, args: &RunArgs) -> Result<()> {
    if let Some(max_iterations) = args.max_iterations {
        config.workflow.max_iterations = max_iterations;
    }
    if let Some(provider) = args.provider {
        config.llm.provider = provider;
    }
    if let Some(model) = &args.model {
        config.llm.model.clone_from(model);
    }
    if args.fail_on_parse_miss {
        config.workflow.extraction_policy = ExtractionPolicy::Fail;
    }
    if let Some(workspace) = &args.workspace {
        config.workspace.root_path.clone_from(workspace);
    }
    if args.no_checkpoint {
        config.workflow.checkpoint = false;
    }
    config.validate()?;
    Ok(())
}

fn mock_provider(script: Option<&Path>) -> Result<MockProvider> {
    let Some(path) = script else {
        return Ok(MockProvider::new());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read mock script {}", path.display()))?;
    let script: MockScript = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid mock script {}", path.display()))?;

    let mut provider = MockProvider::new();
    for entry in script.replies {
        provider = provider.with_sequence(entry.pattern, entry.replies);
    }
    if let Some(default) = script.default {
        provider = provider.with_default_response(default);
    }
    Ok(provider)
}

fn build_provider(
    config: &DatacrewConfig,
    script: Option<&Path>,
) -> Result<Arc<dyn ModelProvider>> {
    let llm = &config.llm;
    if script.is_some() && llm.provider != ProviderKind::Mock {
        bail!("--script only applies to the mock provider");
    }
    Ok(match llm.provider {
        ProviderKind::Mock => Arc::new(mock_provider(script)?),
        ProviderKind::OpenRouter => Arc::new(
            OpenRouterProvider::from_config_or_env(config.api_key())?
                .with_model(llm.model.clone())
                .with_timeout(llm.timeout())?,
        ),
        ProviderKind::Ollama => {
            let mut provider =
                OllamaProvider::new(llm.model.clone()).with_timeout(llm.timeout())?;
            if let Some(url) = &llm.base_url {
                provider = provider.with_url(url.clone());
            }
            Arc::new(provider)
        }
    })
}

/// Process executor, wrapped for one restart when configured.
fn build_executor(config: &DatacrewConfig, session_dir: &Path) -> Arc<dyn Executor> {
    let mut executor = ProcessExecutor::from_config(&config.executor);
    if config.executor.working_dir.is_none() {
        executor = executor.with_working_dir(session_dir);
    }
    if config.executor.restart_on_crash {
        Arc::new(RestartingExecutor::new(executor))
    } else {
        Arc::new(executor)
    }
}

/// Absolute dataset path when it exists locally; URIs are kept as given.
fn dataset_ref(dataset: &str) -> DatasetRef {
    fs::canonicalize(dataset).map_or_else(
        |_| DatasetRef::new(dataset),
        |path| DatasetRef::new(path.display().to_string()),
    )
}

fn render_events(mut receiver: UnboundedReceiver<WorkflowEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let term = Term::stdout();
        while let Some(event) = receiver.recv().await {
            if let Err(error) = term.write_line(&event_line(&event)) {
                tracing::debug!("Failed to render event: {error}");
            }
        }
    })
}

/// Handle `datacrew run`
///
/// Returns whether the workflow succeeded.
///
/// # Errors
/// Returns an error if configuration, provider or storage setup fails
pub async fn handle_run(args: RunArgs) -> Result<bool> {
    init_tracing(args.log_file.as_deref())?;

    let (mut config, config_path) = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args)?;
    tracing::info!(
        "Using config {} with provider {:?}",
        config_path.display(),
        config.llm.provider
    );

    let provider = build_provider(&config, args.script.as_deref())?;
    if !provider.is_available().await {
        tracing::warn!("Provider {} reports it is unavailable", provider.name());
    }

    let store = Arc::new(FileWorkspace::new(config.workspace.root_path.clone()));
    let state = SharedState::new(args.request, dataset_ref(&args.dataset));
    let session_dir = store.session_dir(state.session_id());
    fs::create_dir_all(&session_dir)
        .with_context(|| format!("Failed to create {}", session_dir.display()))?;

    let executor = build_executor(&config, &session_dir);
    let (events, receiver) = EventChannel::new();
    let renderer = render_events(receiver);

    let report = {
        let engine = WorkflowEngine::from_config(
            &config,
            builtin_agents(provider, Some(executor), &config),
        )?
        .with_events(events)
        .with_store(store);
        engine.execute_state(state).await
    };
    if let Err(error) = renderer.await {
        tracing::debug!("Event renderer stopped: {error}");
    }

    let term = Term::stdout();
    term.write_line("")?;
    term.write_line(&report_text(&report))?;
    term.write_line(&format!(
        "{} {}",
        style("Report:").dim(),
        session_dir.join("report.md").display()
    ))?;

    Ok(report.success)
}

/// Handle `datacrew config`: print the config path and its effective contents
///
/// # Errors
/// Returns an error if the config cannot be loaded or serialized
pub fn handle_config(path: Option<&Path>) -> Result<()> {
    let (config, config_path) = load_config(path)?;
    let term = Term::stdout();
    term.write_line(&format!(
        "{} {}",
        style("Config file:").cyan().bold(),
        config_path.display()
    ))?;
    term.write_line(&toml::to_string_pretty(&config)?)?;
    Ok(())
}
