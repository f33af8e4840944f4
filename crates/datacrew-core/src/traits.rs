use async_trait::async_trait;

use crate::{Context, Query, Response, Result};

/// LLM text-completion capability consumed by agents.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Returns the unique identifier for this provider.
    fn name(&self) -> &'static str;

    /// Checks whether this provider is currently available and ready to process requests.
    async fn is_available(&self) -> bool;

    /// Generates a completion for the given query using the provided role context.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unavailable, the request fails,
    /// or the response cannot be parsed.
    async fn generate(&self, query: &Query, context: &Context) -> Result<Response>;

    /// Estimates the cost in USD for processing the given context.
    fn estimate_cost(&self, context: &Context) -> f64;
}
