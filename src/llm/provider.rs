//! Provider trait and types for LLM abstraction.
//!
//! Defines the [`LlmClient`] trait every capability that needs a model
//! (query expansion, document filtering, sufficiency checking, synthesis)
//! depends on, along with its request/response types.

use crate::llm::error::LlmResult;
use crate::llm::messages::Message;
use serde::{Deserialize, Serialize};

/// Optional generation parameters for a completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestConfig {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
}

/// Token usage reported by the provider, when available.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Result of a completion request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Raw text content of the response.
    pub content: String,
    /// Parsed JSON, populated when the caller passed a `json_schema`.
    pub structured_response: Option<serde_json::Value>,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
}

/// Trait every LLM-backed capability depends on.
///
/// A single entry point: send a short system+user message pair, optionally
/// constrained to a JSON schema, and get back a completion. There is no
/// conversation history, tool calling, or streaming in this system.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<Message>,
        json_schema: Option<serde_json::Value>,
        config: Option<RequestConfig>,
    ) -> LlmResult<Completion>;

    /// Name of the backing provider, for logging.
    fn provider_name(&self) -> &'static str;
}
