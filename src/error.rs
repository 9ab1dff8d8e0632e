//! Crate-wide error type for the deep-search orchestrator.

use crate::logging::{log_error, log_warn};
use thiserror::Error;

/// Broad classification used for logging and dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Client,
    External,
    Transient,
    Internal,
    BusinessLogic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

pub type DeepSearchResult<T> = std::result::Result<T, DeepSearchError>;

/// The seven error kinds from spec §7.
#[derive(Error, Debug)]
pub enum DeepSearchError {
    #[error("query expansion failed: {message}")]
    ExpansionFailed { message: String },

    #[error("search unavailable: all sub-queries failed ({message})")]
    SearchUnavailable { message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("fetch failed: {message}")]
    FetchFailed { message: String },

    #[error("LLM unavailable: {message}")]
    LLMUnavailable { message: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl DeepSearchError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ExpansionFailed { .. } => ErrorCategory::BusinessLogic,
            Self::SearchUnavailable { .. } => ErrorCategory::External,
            Self::RateLimited { .. } => ErrorCategory::Transient,
            Self::FetchFailed { .. } => ErrorCategory::External,
            Self::LLMUnavailable { .. } => ErrorCategory::External,
            Self::Cancelled => ErrorCategory::Client,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Whether the failing operation is worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::SearchUnavailable { .. } | Self::LLMUnavailable { .. }
        )
    }

    /// Message safe to surface in a response envelope.
    pub fn user_message(&self) -> String {
        match self {
            Self::ExpansionFailed { .. } => {
                "Could not interpret the question into a search.".to_string()
            }
            Self::SearchUnavailable { .. } => {
                "The filing catalogue is temporarily unavailable.".to_string()
            }
            Self::RateLimited { .. } => "Rate limit reached, please retry shortly.".to_string(),
            Self::FetchFailed { .. } => "Some filings could not be retrieved.".to_string(),
            Self::LLMUnavailable { .. } => {
                "The language model backend is temporarily unavailable.".to_string()
            }
            Self::Cancelled => "The search was cancelled.".to_string(),
            Self::Internal { .. } => "An internal error occurred.".to_string(),
        }
    }

    pub fn expansion_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let err = Self::ExpansionFailed {
            message: message.clone(),
        };
        log_error!(kind = "ExpansionFailed", message = %message, "query expansion failed");
        err
    }

    pub fn search_unavailable(message: impl Into<String>) -> Self {
        let message = message.into();
        let err = Self::SearchUnavailable {
            message: message.clone(),
        };
        log_error!(kind = "SearchUnavailable", message = %message, "search unavailable");
        err
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        let message = message.into();
        let err = Self::RateLimited {
            message: message.clone(),
        };
        log_warn!(kind = "RateLimited", message = %message, "rate limited");
        err
    }

    pub fn fetch_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        let err = Self::FetchFailed {
            message: message.clone(),
        };
        log_warn!(kind = "FetchFailed", message = %message, "fetch failed");
        err
    }

    pub fn llm_unavailable(message: impl Into<String>) -> Self {
        let message = message.into();
        let err = Self::LLMUnavailable {
            message: message.clone(),
        };
        log_warn!(kind = "LLMUnavailable", message = %message, "LLM unavailable");
        err
    }

    pub fn cancelled() -> Self {
        log_warn!(kind = "Cancelled", "run cancelled");
        Self::Cancelled
    }

    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        let err = Self::Internal {
            message: message.clone(),
        };
        log_error!(kind = "Internal", message = %message, "internal error");
        err
    }
}

impl From<crate::llm::LlmError> for DeepSearchError {
    fn from(err: crate::llm::LlmError) -> Self {
        Self::llm_unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        assert!(DeepSearchError::rate_limited("quota").is_retryable());
    }

    #[test]
    fn expansion_failed_is_not_retryable() {
        assert!(!DeepSearchError::expansion_failed("bad json").is_retryable());
    }

    #[test]
    fn cancelled_is_warning_severity() {
        assert_eq!(DeepSearchError::cancelled().severity(), ErrorSeverity::Warning);
    }
}
