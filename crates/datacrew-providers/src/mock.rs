//! Scripted provider for offline runs and tests.
//!
//! Replies are registered against substring patterns. A pattern may carry a
//! queue of replies: each matching call consumes the front entry and the last
//! entry sticks once the queue is down to one, so a script like
//! `["reject", "approve"]` answers the first call with a rejection and every
//! later call with an approval.

use async_trait::async_trait;
use datacrew_core::{
    Context, Error, IgnoreLock as _, ModelProvider, Query, Response, Result, TokenUsage,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Return this completion text
    Text(String),
    /// Fail the call with a provider error
    Fail(String),
    /// Wait before answering, for exercising call timeouts
    Delayed(Duration, String),
}

impl From<&str> for MockReply {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for MockReply {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Pattern with its pending replies.
type Script = (String, VecDeque<MockReply>);

/// Mock provider that returns pre-defined responses based on query patterns.
#[derive(Clone, Default)]
pub struct MockProvider {
    /// Scripts in registration order; the first matching pattern wins
    scripts: Arc<Mutex<Vec<Script>>>,
    /// Reply when no pattern matches
    default_response: Arc<Mutex<Option<String>>>,
    /// Query texts seen so far
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Creates a mock provider without any scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every query containing `pattern` with `response`.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<MockReply>) -> Self {
        self.with_sequence(pattern, [response.into()])
    }

    /// Answers successive queries containing `pattern` with `replies` in order.
    #[must_use]
    pub fn with_sequence<I, R>(self, pattern: impl Into<String>, replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<MockReply>,
    {
        let queue: VecDeque<MockReply> = replies.into_iter().map(Into::into).collect();
        if !queue.is_empty() {
            self.scripts
                .lock_ignore_poison()
                .push((pattern.into(), queue));
        }
        self
    }

    /// Set a default response for queries that don't match any pattern.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.lock_ignore_poison() = Some(response.into());
        self
    }

    /// Clear the call history.
    pub fn clear_history(&self) {
        self.call_history.lock_ignore_poison().clear();
    }

    /// Get the call history (list of all queries made).
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    /// Number of calls whose query contained `pattern`.
    #[must_use]
    pub fn calls_matching(&self, pattern: &str) -> usize {
        self.call_history
            .lock_ignore_poison()
            .iter()
            .filter(|text| text.contains(pattern))
            .count()
    }

    /// Takes the next reply of the first script matching the query.
    fn next_reply(&self, query_text: &str, system_prompt: &str) -> Option<MockReply> {
        let mut scripts = self.scripts.lock_ignore_poison();
        let (_, queue) = scripts.iter_mut().find(|(pattern, _)| {
            query_text.contains(pattern.as_str()) || system_prompt.contains(pattern.as_str())
        })?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate(&self, query: &Query, context: &Context) -> Result<Response> {
        self.call_history
            .lock_ignore_poison()
            .push(query.text.clone());

        let reply = self
            .next_reply(&query.text, &context.system_prompt)
            .unwrap_or_else(|| {
                let default = self.default_response.lock_ignore_poison().clone();
                MockReply::Text(
                    default.unwrap_or_else(|| format!("Mock response for query: {}", query.text)),
                )
            });

        let text = match reply {
            MockReply::Text(text) => text,
            MockReply::Fail(message) => return Err(Error::Provider(message)),
            MockReply::Delayed(delay, text) => {
                sleep(delay).await;
                text
            }
        };

        Ok(Response {
            text,
            confidence: 1.0,
            tokens_used: TokenUsage {
                input: query.text.len() as u64,
                ..TokenUsage::default()
            },
            provider: self.name().to_owned(),
            latency_ms: 0,
        })
    }

    fn estimate_cost(&self, _context: &Context) -> f64 {
        0.0
    }
}
