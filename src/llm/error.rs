//! Error types for LLM backend operations.
//!
//! This module provides structured error handling for the narrow LLM client
//! used by the orchestrator's query expansion, document filtering,
//! sufficiency checking and synthesis steps.
//!
//! # Error Handling Example
//!
//! ```rust,no_run
//! use dart_deep_search::llm::error::LlmError;
//!
//! fn handle_error(err: LlmError) {
//!     if err.is_retryable() {
//!         println!("Retryable error: {}", err);
//!     }
//!     println!("Tell user: {}", err.user_message());
//! }
//! ```

use crate::logging::{log_error, log_warn};
use thiserror::Error;

/// High-level categorization of errors for routing and handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// External service failures (LLM provider, network issues).
    External,
    /// Client errors (invalid input, authentication, configuration).
    Client,
    /// Temporary failures that should be retried.
    Transient,
}

/// Severity level for logging and alerting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Action failed but system is stable.
    Error,
    /// Unexpected but recoverable situation.
    Warning,
}

/// Convenient result type for LLM backend operations.
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Errors that can occur while talking to the configured LLM provider.
///
/// | Variant | Category | Retryable |
/// |---------|----------|-----------|
/// | `UnsupportedProvider` | Client | No |
/// | `ConfigurationError` | Client | No |
/// | `RequestFailed` | External | Yes |
/// | `ResponseParsingError` | External | No |
/// | `RateLimitExceeded` | Transient | Yes |
/// | `Timeout` | Transient | Yes |
/// | `AuthenticationFailed` | Client | No |
/// | `SchemaValidationFailed` | Client | No |
#[derive(Error, Debug)]
pub enum LlmError {
    /// The configured provider name isn't one this crate knows how to talk to.
    ///
    /// Supported providers: "anthropic", "openai"
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// Provider configuration is invalid or incomplete (missing API key, bad base URL, ...).
    #[error("Provider configuration error: {message}")]
    ConfigurationError { message: String },

    /// The HTTP request to the provider failed.
    #[error("Request failed: {message}")]
    RequestFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider returned a response, but it couldn't be parsed.
    #[error("Response parsing failed: {message}")]
    ResponseParsingError { message: String },

    /// Provider rate limit exceeded; `retry_after_seconds` is the recommended wait.
    #[error("Rate limit exceeded, retry after {retry_after_seconds}s")]
    RateLimitExceeded { retry_after_seconds: u64 },

    /// The provider didn't respond within the configured timeout.
    #[error("Request timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    /// Authentication with the provider failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The model's response didn't conform to the requested JSON schema.
    #[error("JSON schema validation failed: {message}")]
    SchemaValidationFailed { message: String },
}

impl LlmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedProvider { .. } => ErrorCategory::Client,
            Self::ConfigurationError { .. } => ErrorCategory::Client,
            Self::RequestFailed { .. } => ErrorCategory::External,
            Self::ResponseParsingError { .. } => ErrorCategory::External,
            Self::RateLimitExceeded { .. } => ErrorCategory::Transient,
            Self::Timeout { .. } => ErrorCategory::Transient,
            Self::AuthenticationFailed { .. } => ErrorCategory::Client,
            Self::SchemaValidationFailed { .. } => ErrorCategory::Client,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::UnsupportedProvider { .. } => ErrorSeverity::Error,
            Self::ConfigurationError { .. } => ErrorSeverity::Error,
            Self::RequestFailed { .. } => ErrorSeverity::Error,
            Self::ResponseParsingError { .. } => ErrorSeverity::Warning,
            Self::RateLimitExceeded { .. } => ErrorSeverity::Warning,
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::AuthenticationFailed { .. } => ErrorSeverity::Error,
            Self::SchemaValidationFailed { .. } => ErrorSeverity::Warning,
        }
    }

    /// Whether retrying this error (with backoff) is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::Timeout { .. } | Self::RequestFailed { .. }
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedProvider { .. } => {
                "The requested AI provider is not supported".to_string()
            }
            Self::ConfigurationError { .. } => {
                "AI service configuration issue. Please check your settings".to_string()
            }
            Self::RequestFailed { .. } => {
                "Unable to communicate with AI service. Please try again".to_string()
            }
            Self::ResponseParsingError { .. } => {
                "Received an invalid response from AI service".to_string()
            }
            Self::RateLimitExceeded {
                retry_after_seconds,
            } => {
                format!("Service is busy. Please wait {retry_after_seconds} seconds and try again")
            }
            Self::Timeout { .. } => "Request timed out. Please try again".to_string(),
            Self::AuthenticationFailed { .. } => {
                "Authentication failed. Please check your credentials".to_string()
            }
            Self::SchemaValidationFailed { .. } => "Response format validation failed".to_string(),
        }
    }

    // Constructor methods with automatic logging, mirroring the rest of the crate's error types.

    pub fn unsupported_provider(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        log_error!(provider = %provider, error_type = "unsupported_provider", "Unsupported LLM provider requested");
        Self::UnsupportedProvider { provider }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(error_type = "configuration_error", message = %message, "LLM configuration validation failed");
        Self::ConfigurationError { message }
    }

    pub fn request_failed(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let message = message.into();
        log_error!(error_type = "request_failed", message = %message, has_source = source.is_some(), "LLM request execution failed");
        Self::RequestFailed { message, source }
    }

    pub fn response_parsing_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(error_type = "response_parsing_error", message = %message, "LLM response format invalid");
        Self::ResponseParsingError { message }
    }

    pub fn rate_limit_exceeded(retry_after_seconds: u64) -> Self {
        log_warn!(error_type = "rate_limit_exceeded", retry_after_seconds, "LLM provider rate limit exceeded");
        Self::RateLimitExceeded {
            retry_after_seconds,
        }
    }

    pub fn timeout(timeout_seconds: u64) -> Self {
        log_warn!(error_type = "timeout", timeout_seconds, "LLM request timed out");
        Self::Timeout { timeout_seconds }
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(error_type = "authentication_failed", message = %message, "LLM provider authentication failed");
        Self::AuthenticationFailed { message }
    }

    pub fn schema_validation_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        log_warn!(error_type = "schema_validation_failed", message = %message, "LLM response schema validation failed");
        Self::SchemaValidationFailed { message }
    }
}
