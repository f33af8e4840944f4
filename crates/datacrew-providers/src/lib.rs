//! Model provider adapters: scripted mock, `OpenRouter` and local Ollama.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        reason = "Allow for tests"
    )
)]

/// Scripted offline provider.
pub mod mock;
/// Local Ollama provider.
pub mod ollama;
/// `OpenRouter` provider.
pub mod openrouter;

pub use mock::{MockProvider, MockReply};
pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;
