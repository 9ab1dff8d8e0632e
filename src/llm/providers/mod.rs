//! Concrete [`LlmClient`](crate::llm::provider::LlmClient) implementations.

mod anthropic;
mod openai;
mod openai_shared;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
