//! Model client trait — the abstraction over the LLM backend.
//!
//! Only the top completion's text matters to the loop. Retries, rate limiting
//! and transport concerns belong to the implementation, never to the caller.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::message::Message;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// The client name (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send the conversation and return the text of the top completion.
    async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError>;
}
