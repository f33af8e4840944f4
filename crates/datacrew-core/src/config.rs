//! Configuration for model access, code execution, the workflow loop and storage.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Env var key for the `OpenRouter` API key.
pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";

/// Complete datacrew configuration.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatacrewConfig {
    /// Model provider settings
    pub llm: LlmConfig,
    /// Code executor settings
    pub executor: ExecutorConfig,
    /// Workflow loop settings
    pub workflow: WorkflowConfig,
    /// Session storage settings
    pub workspace: WorkspaceConfig,
}

/// Which model backend agents talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Scripted offline provider
    #[default]
    Mock,
    /// `OpenRouter` chat completions
    #[serde(rename = "openrouter")]
    OpenRouter,
    /// Local Ollama server
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openrouter" | "open_router" => Ok(Self::OpenRouter),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(Error::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// Model provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend to use
    pub provider: ProviderKind,
    /// Model name passed to the backend
    pub model: String,
    /// Base URL override (Ollama server address)
    pub base_url: Option<String>,
    /// API key; falls back to the environment when absent
    pub api_key: Option<String>,
    /// Timeout in seconds for a single model call
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Mock,
            model: "anthropic/claude-sonnet-4".to_owned(),
            base_url: None,
            api_key: None,
            timeout_seconds: 120,
        }
    }
}

impl LlmConfig {
    /// Model call time budget.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Code executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Interpreter command; the script path is appended as last argument
    pub interpreter: Vec<String>,
    /// Wall-clock timeout in seconds per submission
    pub timeout_seconds: u64,
    /// Restart the executor and retry once after an internal failure
    pub restart_on_crash: bool,
    /// Working directory for submitted code (session directory when absent)
    pub working_dir: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: vec!["python3".to_owned()],
            timeout_seconds: 60,
            restart_on_crash: true,
            working_dir: None,
        }
    }
}

impl ExecutorConfig {
    /// Per-submission time budget.
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// What to do when a model output cannot be parsed into a structured record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPolicy {
    /// Substitute a default record flagged with `"fallback": true`
    #[default]
    Degrade,
    /// Report the agent invocation as failed
    Fail,
}

/// Workflow loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Hard ceiling on controller cycles, enforced by router and engine
    pub max_iterations: u32,
    /// Parse-miss policy for agent outputs
    pub extraction_policy: ExtractionPolicy,
    /// Write `state.json` to the workspace after every cycle
    pub checkpoint: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            extraction_policy: ExtractionPolicy::Degrade,
            checkpoint: true,
        }
    }
}

/// Session storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding one sub-directory per session
    pub root_path: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from(".datacrew").join("sessions"),
        }
    }
}

impl DatacrewConfig {
    /// Get the default config directory path (`~/.datacrew`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".datacrew"))
    }

    /// Get the default config file path (`~/.datacrew/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, creating it with defaults if missing.
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        tracing::debug!(
            "Loaded config from {}: provider={:?}, max_iterations={}, api_key={}",
            path.display(),
            config.llm.provider,
            config.workflow.max_iterations,
            if config.llm.api_key.is_some() {
                "present"
            } else {
                "missing"
            }
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Datacrew Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Rejects settings the workflow cannot run with.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.workflow.max_iterations == 0 {
            return Err(Error::Config(
                "workflow.max_iterations must be at least 1".to_owned(),
            ));
        }
        if self.executor.interpreter.is_empty() {
            return Err(Error::Config(
                "executor.interpreter must name a command".to_owned(),
            ));
        }
        if self.executor.timeout_seconds == 0 || self.llm.timeout_seconds == 0 {
            return Err(Error::Config("timeouts must be positive".to_owned()));
        }
        Ok(())
    }

    /// API key for the configured provider, checking config first, then environment variables
    pub fn api_key(&self) -> Option<String> {
        match self.llm.provider {
            ProviderKind::OpenRouter => self
                .llm
                .api_key
                .clone()
                .or_else(|| env::var(ENV_OPENROUTER_API_KEY).ok()),
            ProviderKind::Mock | ProviderKind::Ollama => self.llm.api_key.clone(),
        }
    }
}
