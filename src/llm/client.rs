//! Unified LLM client dispatching to the configured provider.

use crate::llm::config::{AnthropicConfig, LlmConfig, OpenAiConfig};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::messages::Message;
use crate::llm::provider::{Completion, LlmClient, RequestConfig};
use crate::llm::providers::{AnthropicProvider, OpenAiProvider};
use crate::logging::log_debug;

/// Internal provider enum (not exposed publicly).
enum Provider {
    Anthropic(AnthropicProvider),
    OpenAi(OpenAiProvider),
}

/// Unified client for the two supported LLM providers.
///
/// `UnifiedLlmClient` wraps whichever provider is configured behind a single
/// [`LlmClient`] interface, so the rest of the pipeline never branches on
/// provider identity.
pub struct UnifiedLlmClient {
    provider: Provider,
}

impl UnifiedLlmClient {
    fn create_anthropic_provider(config: &LlmConfig) -> LlmResult<Provider> {
        let anthropic_config = config
            .provider
            .as_any()
            .downcast_ref::<AnthropicConfig>()
            .ok_or_else(|| LlmError::configuration_error("Invalid Anthropic configuration"))?;

        let provider =
            AnthropicProvider::new(anthropic_config.clone(), config.default_params.clone())?;

        Ok(Provider::Anthropic(provider))
    }

    fn create_openai_provider(config: &LlmConfig) -> LlmResult<Provider> {
        let openai_config = config
            .provider
            .as_any()
            .downcast_ref::<OpenAiConfig>()
            .ok_or_else(|| LlmError::configuration_error("Invalid OpenAI configuration"))?;

        let provider = OpenAiProvider::new(openai_config.clone(), config.default_params.clone())?;

        Ok(Provider::OpenAi(provider))
    }

    /// Create a client for a named provider ("anthropic" or "openai").
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnsupportedProvider`] if the name isn't recognized,
    /// or [`LlmError::ConfigurationError`] if the config doesn't match the
    /// provider or fails validation.
    pub fn create(provider_name: &str, config: LlmConfig) -> LlmResult<Self> {
        let provider = match provider_name {
            "anthropic" => Self::create_anthropic_provider(&config)?,
            "openai" => Self::create_openai_provider(&config)?,
            _ => return Err(LlmError::unsupported_provider(provider_name)),
        };

        log_debug!(provider = provider_name, "UnifiedLlmClient created");

        Ok(Self { provider })
    }

    /// Create a client using environment variables for configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if required environment
    /// variables are missing or provider validation fails.
    pub fn from_env() -> LlmResult<Self> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Create a client from an [`LlmConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnsupportedProvider`] if the config's provider name
    /// isn't recognized.
    pub fn from_config(config: LlmConfig) -> LlmResult<Self> {
        let provider_name = config.provider.provider_name();

        log_debug!(
            target_provider = provider_name,
            "Creating UnifiedLlmClient from config"
        );

        Self::create(provider_name, config)
    }
}

#[async_trait::async_trait]
impl LlmClient for UnifiedLlmClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        json_schema: Option<serde_json::Value>,
        config: Option<RequestConfig>,
    ) -> LlmResult<Completion> {
        match &self.provider {
            Provider::Anthropic(p) => p.complete(messages, json_schema, config).await,
            Provider::OpenAi(p) => p.complete(messages, json_schema, config).await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match &self.provider {
            Provider::Anthropic(_) => "anthropic",
            Provider::OpenAi(_) => "openai",
        }
    }
}
