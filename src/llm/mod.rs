//! LLM backend: a narrow multi-provider client used by the query expander,
//! document filter, sufficiency checker and synthesizer.
//!
//! Unlike a general-purpose chat client, this backend exposes a single
//! [`provider::LlmClient::complete`] entry point: messages in, an optional
//! JSON schema, a [`provider::Completion`] out. There is no tool calling, no
//! prompt caching, and only two providers (Anthropic, OpenAI-compatible) —
//! this system only ever talks to one configured hosted LLM backend.

pub mod client;
pub mod config;
pub mod error;
pub mod messages;
pub mod provider;
pub mod providers;
pub mod response_parser;

pub(crate) mod internals;

pub use client::UnifiedLlmClient;
pub use config::{AnthropicConfig, DefaultLlmParams, LlmConfig, OpenAiConfig, ProviderConfig};
pub use error::{LlmError, LlmResult};
pub use messages::{Message, Role};
pub use provider::{Completion, LlmClient, RequestConfig, TokenUsage};
pub use response_parser::ResponseParser;
