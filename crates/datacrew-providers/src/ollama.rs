use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use datacrew_core::{Context, Error, ModelProvider, Query, Response, Result, TokenUsage};

/// Default local Ollama address.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Request body for `/api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'req> {
    model: &'req str,
    prompt: &'req str,
    system: &'req str,
    stream: bool,
}

/// Non-streaming `/api/generate` reply.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

/// Model provider backed by a local Ollama server
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model_name: String,
}

impl OllamaProvider {
    /// Creates a provider for `model_name` on the default local server.
    #[must_use]
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_OLLAMA_URL.to_owned(),
            model_name: model_name.into(),
        }
    }

    /// Points the provider at another server.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_owned();
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

    /// Folds the context sections into the prompt.
    fn build_prompt(query: &Query, context: &Context) -> String {
        let mut prompt = query.text.clone();
        if !context.sections.is_empty() {
            prompt.push_str("\n\nWorkflow state:\n");
            for section in &context.sections {
                let _ignored = write!(prompt, "\n--- {} ---\n{}\n", section.title, section.body);
            }
        }
        prompt
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    async fn generate(&self, query: &Query, context: &Context) -> Result<Response> {
        let start = Instant::now();
        let prompt = Self::build_prompt(query, context);
        let request = GenerateRequest {
            model: &self.model_name,
            prompt: &prompt,
            system: &context.system_prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("Ollama request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "Ollama returned error: {}",
                response.status()
            )));
        }

        let reply: GenerateResponse = response.json().await.map_err(|err| {
            Error::InvalidResponse(format!("Failed to parse Ollama response: {err}"))
        })?;

        Ok(Response {
            text: reply.response,
            confidence: 0.85,
            tokens_used: TokenUsage {
                input: reply.prompt_eval_count,
                output: reply.eval_count,
                ..TokenUsage::default()
            },
            provider: format!("ollama/{}", self.model_name),
            latency_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn estimate_cost(&self, _context: &Context) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = OllamaProvider::new("qwen2.5:7b").with_url("http://gpu-box:11434/");
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model_name, "qwen2.5:7b");
        assert_eq!(provider.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_cost_is_free() {
        let provider = OllamaProvider::new("qwen2.5:7b");
        assert!(provider.estimate_cost(&Context::new("")).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prompt_includes_sections() {
        let context = Context::new("role").with_section("Data profile", "150 rows");
        let prompt = OllamaProvider::build_prompt(&Query::new("train a model"), &context);
        assert!(prompt.starts_with("train a model"));
        assert!(prompt.contains("--- Data profile ---\n150 rows"));
    }

    #[test]
    fn test_generate_response_parsing() {
        let reply: GenerateResponse =
            serde_json::from_str(r#"{"response":"ok","done":true,"eval_count":7}"#).unwrap();
        assert_eq!(reply.response, "ok");
        assert_eq!(reply.eval_count, 7);
        assert_eq!(reply.prompt_eval_count, 0);
    }
}
