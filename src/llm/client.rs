// ABOUTME: Defines the ChatClient trait - the single seam where the gateway
// ABOUTME: talks to the remote provider. Everything else is local.

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse};
use crate::error::LlmError;

/// Trait for chat completion transports.
///
/// Implementations must report the provider's quota rejection as
/// [`LlmError::RateLimited`] and every other non-success status as
/// [`LlmError::Api`].
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send one request and wait for the full response.
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, LlmError>;
}
