//! Process-wide configuration, loaded from environment variables.
//!
//! Mirrors the teacher's [`crate::llm::config::LlmConfig::from_env`] pattern:
//! a typed, validated struct constructed once and threaded through the
//! orchestrator and its components.

pub use crate::model::RunOptions;

use crate::error::{DeepSearchError, DeepSearchResult};
use crate::llm::config::LlmConfig;
use crate::logging::log_debug;

/// Validated configuration for one orchestrator instance.
#[derive(Debug)]
pub struct DeepSearchConfig {
    pub dart_api_key: String,
    pub max_search_results: u32,
    pub api_rate_limit_per_day: u32,
    pub parallel_downloads: usize,
    /// Per-request deadline for the filing API client (`DART_PARSE_TIMEOUT_MS`).
    pub parse_timeout_ms: u64,
    pub llm: LlmConfig,
}

impl DeepSearchConfig {
    /// Load from environment variables, per spec §6.
    ///
    /// # Errors
    ///
    /// Returns [`DeepSearchError::Internal`] if `DART_API_KEY` is missing, or
    /// propagates an LLM configuration error.
    pub fn from_env() -> DeepSearchResult<Self> {
        let dart_api_key = std::env::var("DART_API_KEY").map_err(|_| {
            DeepSearchError::internal("DART_API_KEY environment variable is required")
        })?;

        let max_search_results = env_u32("DART_MAX_SEARCH_RESULTS", 100);
        let api_rate_limit_per_day = env_u32("DART_API_RATE_LIMIT", 1000);
        let parallel_downloads = env_u32("DART_PARALLEL_DOWNLOADS", 3) as usize;
        let parse_timeout_ms = env_u64("DART_PARSE_TIMEOUT_MS", 30_000);

        let llm = LlmConfig::from_env()?;

        log_debug!(
            max_search_results,
            api_rate_limit_per_day,
            parallel_downloads,
            llm_provider = llm.provider.provider_name(),
            "Deep-search configuration loaded"
        );

        Ok(Self {
            dart_api_key,
            max_search_results,
            api_rate_limit_per_day,
            parallel_downloads,
            parse_timeout_ms,
            llm,
        })
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
