use std::env;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use datacrew_core::config::ENV_OPENROUTER_API_KEY;
use datacrew_core::{Context, Error, ModelProvider, Query, Response, Result, TokenUsage};

/// `OpenRouter` API endpoint URL.
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
/// Default model for `OpenRouter`.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

/// Provider implementation for `OpenRouter` chat completions.
pub struct OpenRouterProvider {
    /// HTTP client for API requests.
    client: Client,
    /// `OpenRouter` API key.
    api_key: String,
    /// Model name to use.
    model: String,
    /// Sampling temperature.
    temperature: f32,
}

impl OpenRouterProvider {
    /// Creates a new `OpenRouterProvider` with the given API key.
    ///
    /// # Errors
    /// Returns an error if the provided API key is empty.
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_OPENROUTER_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
            temperature: 0.2,
        })
    }

    /// Creates a provider from the config key, falling back to the environment.
    ///
    /// # Errors
    /// Returns an error if the API key is not provided anywhere.
    pub fn from_config_or_env(config_key: Option<String>) -> Result<Self> {
        let api_key = config_key
            .or_else(|| env::var(ENV_OPENROUTER_API_KEY).ok())
            .ok_or_else(|| {
                Error::MissingApiKey(format!(
                    "{ENV_OPENROUTER_API_KEY} or config.toml [llm] api_key"
                ))
            })?;
        Self::new(api_key)
    }

    /// Sets the model to use for generation.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the HTTP timeout of a single request.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Builds the chat message list from role context and task text.
    fn build_messages(context: &Context, query: &Query) -> Vec<Value> {
        let mut messages = vec![json!({
            "role": "system",
            "content": context.system_prompt
        })];

        if !context.sections.is_empty() {
            messages.push(json!({
                "role": "user",
                "content": format!("Workflow state:\n{}", context.sections_to_string())
            }));
        }

        messages.push(json!({
            "role": "user",
            "content": query.text
        }));

        messages
    }
}

/// Response payload returned by the `OpenRouter` API.
#[derive(Deserialize)]
struct OpenRouterResponse {
    /// Generated choices.
    choices: Vec<Choice>,
    /// Token usage statistics, when reported.
    usage: Option<Usage>,
}

/// Individual completion choice.
#[derive(Deserialize)]
struct Choice {
    /// Completion message.
    message: Message,
}

/// Message payload.
#[derive(Deserialize)]
struct Message {
    /// Text content; absent for some tool-only replies.
    #[serde(default)]
    content: Option<String>,
}

/// Token accounting for a response.
#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl ModelProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, query: &Query, context: &Context) -> Result<Response> {
        let start = Instant::now();

        let request_body = json!({
            "model": self.model,
            "messages": Self::build_messages(context, query),
            "temperature": self.temperature,
            "max_tokens": 4096,
        });

        tracing::debug!(model = %self.model, "Sending OpenRouter request");

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "datacrew")
            .json(&request_body)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OpenRouter API request failed with status {status}: {error_text}"
            )));
        }

        let api_response: OpenRouterResponse = response
            .json()
            .await
            .map_err(|err| Error::InvalidResponse(format!("Failed to parse response: {err}")))?;

        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::InvalidResponse("No choices from OpenRouter".to_owned()))?;

        let tokens_used = api_response.usage.map_or_else(TokenUsage::default, |usage| {
            TokenUsage {
                input: usage.prompt_tokens,
                output: usage.completion_tokens,
                ..TokenUsage::default()
            }
        });

        Ok(Response {
            text,
            confidence: 1.0,
            tokens_used,
            provider: self.name().to_owned(),
            latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn estimate_cost(&self, context: &Context) -> f64 {
        let tokens = context.token_estimate() as f64;
        tokens * 3.0 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_with_empty_api_key() {
        let error = OpenRouterProvider::new(String::new())
            .err()
            .expect("empty key must be rejected");
        assert!(matches!(error, Error::MissingApiKey(_)));
    }

    #[test]
    fn test_with_model() {
        let provider = OpenRouterProvider::new("test_key".to_owned())
            .unwrap()
            .with_model("custom-model");
        assert_eq!(provider.model, "custom-model");
        assert_eq!(provider.api_key, "test_key");
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn test_config_key_wins_over_environment() {
        let provider = OpenRouterProvider::from_config_or_env(Some("from_config".to_owned()))
            .unwrap();
        assert_eq!(provider.api_key, "from_config");
    }

    #[test]
    fn test_cost_scales_with_context() {
        let provider = OpenRouterProvider::new("test_key".to_owned()).unwrap();
        let small = Context::new("small");
        let large = Context::new("large ".repeat(100)).with_section("Dataset", "iris.csv");
        assert!(provider.estimate_cost(&large) > provider.estimate_cost(&small));
    }

    #[test]
    fn test_build_messages_with_sections() {
        let context = Context::new("You are the data analyst.")
            .with_section("Completed tasks", "data_profiling");
        let query = Query::new("prepare the data");

        let messages = OpenRouterProvider::build_messages(&context, &query);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"].as_str(), Some("system"));
        assert!(
            messages[1]["content"]
                .as_str()
                .unwrap()
                .contains("## Completed tasks")
        );
        assert_eq!(messages[2]["content"].as_str(), Some("prepare the data"));
    }

    #[test]
    fn test_build_messages_without_sections() {
        let messages =
            OpenRouterProvider::build_messages(&Context::new("system"), &Query::new("task"));
        assert_eq!(messages.len(), 2);
    }
}
