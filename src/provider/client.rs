//! Completion service abstraction.

use super::error::Error;
use super::types::{ChatRequest, Completion};
use async_trait::async_trait;

/// Trait for completion calls.
///
/// Implementations must be safe to share between concurrently summarized
/// documents; one call is in flight per document at a time.
#[async_trait]
pub trait LlmApi: Send + Sync {
    /// Get the provider identifier.
    fn id(&self) -> &str;
    /// Get a non-streaming completion for a single prompt.
    async fn complete(&self, request: ChatRequest) -> Result<Completion, Error>;
}
