use serde::{Deserialize, Serialize};

/// A single request to a model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Task text handed to the model
    pub text: String,
    /// Session the query belongs to, if any
    pub session_id: Option<String>,
}

impl Query {
    /// Creates a query with the given task text.
    pub fn new<T: Into<String>>(text: T) -> Self {
        Self {
            text: text.into(),
            session_id: None,
        }
    }

    /// Tags the query with a session identifier.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Model output for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Completion text
    pub text: String,
    /// Provider confidence in the response (1.0 when unknown)
    pub confidence: f64,
    /// Tokens consumed by the call
    pub tokens_used: TokenUsage,
    /// Name of the provider that answered
    pub provider: String,
    /// Wall-clock latency of the call
    pub latency_ms: u64,
}

/// Token accounting for a single model call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub input: u64,
    /// Completion tokens
    pub output: u64,
    /// Prompt tokens served from cache
    pub cache_read: u64,
    /// Prompt tokens written to cache
    pub cache_write: u64,
}

impl TokenUsage {
    /// Total tokens across all categories.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input + self.output + self.cache_read + self.cache_write
    }
}

/// Role prompt plus the shared-state excerpts an agent hands to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Role description fed to the model as system prompt
    pub system_prompt: String,
    /// Titled excerpts of the shared state
    pub sections: Vec<ContextSection>,
}

impl Context {
    /// Creates a context holding only a system prompt.
    pub fn new<T: Into<String>>(system_prompt: T) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            sections: Vec::new(),
        }
    }

    /// Appends a titled section.
    #[must_use]
    pub fn with_section(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.push(ContextSection {
            title: title.into(),
            body: body.into(),
        });
        self
    }

    /// Renders all sections as markdown.
    #[must_use]
    pub fn sections_to_string(&self) -> String {
        self.sections
            .iter()
            .map(|section| format!("## {}\n{}\n", section.title, section.body))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rough token estimate (four characters per token).
    #[must_use]
    pub fn token_estimate(&self) -> usize {
        let sections_len: usize = self
            .sections
            .iter()
            .map(|section| section.title.len() + section.body.len())
            .sum();
        (self.system_prompt.len() + sections_len) / 4
    }
}

/// A titled block of context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    /// Section heading
    pub title: String,
    /// Section content
    pub body: String,
}
