//! HTTP client for OpenAI-compatible chat-completions endpoints.

use super::types::{OpenAiRequest, OpenAiResponse};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::internals::retry::{RetryExecutor, RetryPolicy};
use crate::logging::log_error;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::Mutex;

/// Shared HTTP client for OpenAI-compatible providers.
#[derive(Debug)]
pub struct OpenAiCompatibleClient {
    client: reqwest::Client,
    retry_executor: Mutex<RetryExecutor>,
}

impl Default for OpenAiCompatibleClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiCompatibleClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            retry_executor: Mutex::new(RetryExecutor::new(RetryPolicy::default())),
        }
    }

    pub fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            retry_executor: Mutex::new(RetryExecutor::new(retry_policy)),
        }
    }

    pub async fn execute_chat_request(
        &self,
        url: &str,
        headers: &HeaderMap,
        request: &OpenAiRequest,
    ) -> LlmResult<OpenAiResponse> {
        let mut retry_executor = self.retry_executor.lock().await;
        retry_executor
            .execute(|| self.execute_single_request(url, headers, request))
            .await
    }

    pub fn build_auth_headers(api_key: &str) -> LlmResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                LlmError::configuration_error(format!("Invalid API key format: {e}"))
            })?,
        );
        Ok(headers)
    }

    async fn execute_single_request(
        &self,
        url: &str,
        headers: &HeaderMap,
        request: &OpenAiRequest,
    ) -> LlmResult<OpenAiResponse> {
        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log_error!(url = %url, error = %e, "HTTP request failed");
                LlmError::request_failed(format!("Request failed: {e}"), Some(Box::new(e)))
            })?;

        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }

        Self::parse_success_response(response).await
    }

    async fn handle_error_response(response: reqwest::Response) -> LlmError {
        let status = response.status();
        let headers = response.headers().clone();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        log_error!(status = %status, error_text = %error_text, "API error response");

        match status.as_u16() {
            401 => {
                if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&error_text) {
                    if let Some(error_obj) = error_json.get("error") {
                        if let Some(code) = error_obj.get("code").and_then(|c| c.as_str()) {
                            if code.contains("api_key") || code.contains("auth") {
                                return LlmError::authentication_failed(
                                    "Invalid API key or authentication failed",
                                );
                            }
                        }
                    }
                }
                LlmError::authentication_failed("Authentication failed")
            }
            429 => {
                let retry_after_seconds = headers
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);
                LlmError::rate_limit_exceeded(retry_after_seconds)
            }
            _ => LlmError::request_failed(format!("API error {status}: {error_text}"), None),
        }
    }

    async fn parse_success_response(response: reqwest::Response) -> LlmResult<OpenAiResponse> {
        let raw_body = response.text().await.map_err(|e| {
            log_error!(error = %e, "Failed to read response body");
            LlmError::response_parsing_error(format!("Failed to read response: {e}"))
        })?;

        serde_json::from_str(&raw_body).map_err(|e| {
            log_error!(error = %e, raw_body = %raw_body, "Failed to parse response");
            LlmError::response_parsing_error(format!("Invalid response: {e}"))
        })
    }
}
