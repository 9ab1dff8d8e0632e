//! Configuration types for the two supported LLM providers.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dart_deep_search::llm::config::{LlmConfig, OpenAiConfig, DefaultLlmParams};
//!
//! let config = LlmConfig {
//!     provider: Box::new(OpenAiConfig {
//!         api_key: Some("sk-...".to_string()),
//!         ..Default::default()
//!     }),
//!     default_params: DefaultLlmParams::default(),
//! };
//! ```
//!
//! # From Environment Variables
//!
//! ```rust,no_run
//! use dart_deep_search::llm::config::LlmConfig;
//!
//! let config = LlmConfig::from_env()?;
//! # Ok::<(), dart_deep_search::llm::error::LlmError>(())
//! ```
//!
//! | Provider | Config Type | Required Env Vars |
//! |----------|------------|-------------------|
//! | OpenAI-compatible | [`OpenAiConfig`] | `OPENAI_API_KEY` |
//! | Anthropic | [`AnthropicConfig`] | `ANTHROPIC_API_KEY` |

use crate::llm::error::{LlmError, LlmResult};
use crate::llm::internals::retry::RetryPolicy;
use crate::logging::log_debug;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;

/// Trait for provider-specific configuration.
pub trait ProviderConfig: Send + Sync + Debug + Any {
    fn provider_name(&self) -> &'static str;
    fn max_context_tokens(&self) -> usize;

    /// Validate that the configuration is complete (API key present, URL non-empty, ...).
    fn validate(&self) -> LlmResult<()>;

    fn base_url(&self) -> &str;
    fn api_key(&self) -> Option<&str>;
    fn default_model(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
    fn retry_policy(&self) -> &RetryPolicy;
}

/// System-wide LLM configuration: a provider plus default request parameters.
#[derive(Debug)]
pub struct LlmConfig {
    pub provider: Box<dyn ProviderConfig>,
    pub default_params: DefaultLlmParams,
}

impl LlmConfig {
    fn clone_provider(&self) -> Box<dyn ProviderConfig> {
        let any_ref = self.provider.as_any();

        if let Some(config) = any_ref.downcast_ref::<AnthropicConfig>() {
            return Box::new(config.clone());
        }
        if let Some(config) = any_ref.downcast_ref::<OpenAiConfig>() {
            return Box::new(config.clone());
        }

        unreachable!("unknown provider type - all provider types should be handled")
    }
}

impl Clone for LlmConfig {
    fn clone(&self) -> Self {
        Self {
            provider: self.clone_provider(),
            default_params: self.default_params.clone(),
        }
    }
}

/// Default parameters applied to a completion request unless overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultLlmParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl Default for DefaultLlmParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
            top_p: 0.9,
        }
    }
}

/// Configuration for Anthropic Claude models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub max_context_tokens: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            default_model: "claude-3-5-sonnet-20241022".to_string(),
            max_context_tokens: 200_000,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ProviderConfig for AnthropicConfig {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    fn validate(&self) -> LlmResult<()> {
        if self.api_key.is_none() {
            return Err(LlmError::configuration_error(
                "Anthropic API key is required",
            ));
        }
        Ok(())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

/// Configuration for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub max_context_tokens: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-4o".to_string(),
            max_context_tokens: 128_000,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ProviderConfig for OpenAiConfig {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    fn validate(&self) -> LlmResult<()> {
        if self.api_key.is_none() {
            return Err(LlmError::configuration_error("OpenAI API key is required"));
        }
        Ok(())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl LlmConfig {
    /// Create configuration for a specific provider with explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::UnsupportedProvider`] if `provider_name` isn't
    /// "anthropic" or "openai", or [`LlmError::ConfigurationError`] if
    /// validation fails (e.g. no API key resolved from args or environment).
    pub fn create_provider(
        provider_name: &str,
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> LlmResult<Self> {
        log_debug!(
            provider = %provider_name,
            has_api_key = api_key.is_some(),
            has_base_url = base_url.is_some(),
            has_model = model.is_some(),
            "Creating provider configuration"
        );

        let provider: Box<dyn ProviderConfig> = match provider_name.to_lowercase().as_str() {
            "anthropic" => Self::create_anthropic_provider(api_key, base_url, model),
            "openai" => Self::create_openai_provider(api_key, base_url, model),
            _ => {
                return Err(LlmError::unsupported_provider(provider_name));
            }
        };

        provider.validate()?;

        Ok(Self {
            provider,
            default_params: DefaultLlmParams::default(),
        })
    }

    fn create_anthropic_provider(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Box<dyn ProviderConfig> {
        let mut config = AnthropicConfig::default();
        if let Some(key) = api_key {
            config.api_key = Some(key);
        } else if let Ok(env_key) = std::env::var("ANTHROPIC_API_KEY") {
            config.api_key = Some(env_key);
        }
        if let Some(url) = base_url {
            config.base_url = url;
        }
        if let Some(m) = model {
            config.default_model = m;
        }
        Box::new(config)
    }

    fn create_openai_provider(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Box<dyn ProviderConfig> {
        let mut config = OpenAiConfig::default();
        if let Some(key) = api_key {
            config.api_key = Some(key);
        } else if let Ok(env_key) = std::env::var("OPENAI_API_KEY") {
            config.api_key = Some(env_key);
        }
        if let Some(url) = base_url {
            config.base_url = url;
        }
        if let Some(m) = model {
            config.default_model = m;
        }
        Box::new(config)
    }

    /// Load configuration from environment variables for the configured provider.
    ///
    /// Reads `DART_LLM_PROVIDER` (defaulting to `anthropic`) to pick the
    /// provider, then the provider-specific vars below.
    pub fn from_env() -> LlmResult<Self> {
        let provider_name =
            std::env::var("DART_LLM_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());

        log_debug!(target_provider = %provider_name, "Loading LLM configuration from environment");

        let provider: Box<dyn ProviderConfig> = match provider_name.as_str() {
            "anthropic" => Self::anthropic_from_env(),
            "openai" => Self::openai_from_env(),
            _ => {
                return Err(LlmError::unsupported_provider(provider_name));
            }
        };

        provider.validate()?;

        log_debug!(
            provider = provider.provider_name(),
            max_context_tokens = provider.max_context_tokens(),
            base_url = provider.base_url(),
            has_api_key = provider.api_key().is_some(),
            "LLM configuration loaded and validated"
        );

        Ok(Self {
            provider,
            default_params: DefaultLlmParams::default(),
        })
    }

    fn anthropic_from_env() -> Box<dyn ProviderConfig> {
        let mut config = AnthropicConfig::default();
        if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
            config.api_key = Some(api_key);
        }
        if let Ok(model) = std::env::var("DART_LLM_MODEL") {
            config.default_model = model;
        }
        Box::new(config)
    }

    fn openai_from_env() -> Box<dyn ProviderConfig> {
        let mut config = OpenAiConfig::default();
        if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
            config.api_key = Some(api_key);
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("DART_LLM_MODEL") {
            config.default_model = model;
        }
        Box::new(config)
    }
}
