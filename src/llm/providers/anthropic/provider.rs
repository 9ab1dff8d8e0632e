//! Anthropic provider implementation.

use super::types::{AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse};
use crate::llm::config::AnthropicConfig;
use crate::llm::config::DefaultLlmParams;
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::internals::retry::RetryExecutor;
use crate::llm::messages::{Message, Role};
use crate::llm::provider::{Completion, LlmClient, RequestConfig, TokenUsage};
use crate::logging::{log_debug, log_error};

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tokio::sync::Mutex;

/// Anthropic Claude provider implementation.
#[derive(Debug)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    retry_executor: Mutex<RetryExecutor>,
    config: AnthropicConfig,
    default_params: DefaultLlmParams,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider instance.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if the API key is missing.
    pub fn new(config: AnthropicConfig, default_params: DefaultLlmParams) -> LlmResult<Self> {
        if config.api_key.is_none() {
            return Err(LlmError::configuration_error(
                "Anthropic API key is required",
            ));
        }

        log_debug!(
            provider = "anthropic",
            max_context_tokens = config.max_context_tokens,
            "Anthropic provider initialized"
        );

        Ok(Self {
            client: reqwest::Client::new(),
            retry_executor: Mutex::new(RetryExecutor::new(config.retry_policy.clone())),
            config,
            default_params,
        })
    }

    fn build_request(
        &self,
        messages: &[Message],
        config: Option<&RequestConfig>,
    ) -> AnthropicRequest {
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let turns = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| AnthropicMessage {
                role: "user".to_string(),
                content: m.content.clone(),
            })
            .collect();

        let temperature = config
            .and_then(|c| c.temperature)
            .unwrap_or(self.default_params.temperature) as f32;
        let max_tokens = config
            .and_then(|c| c.max_tokens)
            .unwrap_or(self.default_params.max_tokens);

        AnthropicRequest {
            system: if system.is_empty() { None } else { Some(system) },
            messages: turns,
            model: self.config.default_model.clone(),
            max_tokens,
            temperature: Some(temperature),
            top_p: config.and_then(|c| c.top_p).map(|p| p as f32),
        }
    }

    async fn send_request(&self, request: AnthropicRequest) -> LlmResult<AnthropicResponse> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::configuration_error("Anthropic API key is required"))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).map_err(|e| {
                LlmError::configuration_error(format!("Invalid API key format: {e}"))
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let mut retry_executor = self.retry_executor.lock().await;
        retry_executor
            .execute(|| self.execute_single_request(&url, &headers, &request))
            .await
    }

    async fn execute_single_request(
        &self,
        url: &str,
        headers: &HeaderMap,
        request: &AnthropicRequest,
    ) -> LlmResult<AnthropicResponse> {
        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log_error!(provider = "anthropic", url = %url, error = %e, "HTTP request failed");
                LlmError::request_failed(format!("Anthropic request failed: {e}"), Some(Box::new(e)))
            })?;

        if !response.status().is_success() {
            return Err(self.handle_error_response(response).await);
        }

        self.parse_success_response(response).await
    }

    fn is_auth_error(error_json: &serde_json::Value) -> bool {
        error_json
            .get("error")
            .and_then(|obj| obj.get("type"))
            .and_then(|t| t.as_str())
            .map(|error_type| {
                error_type.contains("authentication") || error_type.contains("invalid_api_key")
            })
            .unwrap_or(false)
    }

    fn parse_auth_error(error_text: &str) -> LlmError {
        if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_text) {
            if Self::is_auth_error(&error_json) {
                return LlmError::authentication_failed(
                    "Invalid Anthropic API key or authentication failed",
                );
            }
        }
        LlmError::authentication_failed("Anthropic authentication failed")
    }

    fn extract_retry_after(headers: &reqwest::header::HeaderMap) -> u64 {
        headers
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60)
    }

    async fn handle_error_response(&self, response: reqwest::Response) -> LlmError {
        let status = response.status();
        let headers = response.headers().clone();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        log_error!(provider = "anthropic", status = %status, error_text = %error_text, "Anthropic API error");

        match status.as_u16() {
            401 => Self::parse_auth_error(&error_text),
            429 => LlmError::rate_limit_exceeded(Self::extract_retry_after(&headers)),
            _ => LlmError::request_failed(format!("Anthropic API error {status}: {error_text}"), None),
        }
    }

    async fn parse_success_response(
        &self,
        response: reqwest::Response,
    ) -> LlmResult<AnthropicResponse> {
        let raw_body = response.text().await.map_err(|e| {
            LlmError::response_parsing_error(format!("Failed to read response: {e}"))
        })?;

        serde_json::from_str(&raw_body).map_err(|e| {
            log_error!(provider = "anthropic", error = %e, raw_body = %raw_body, "Failed to parse Anthropic response");
            LlmError::response_parsing_error(format!("Invalid Anthropic response: {e}"))
        })
    }

    fn extract_text(api_response: &AnthropicResponse) -> String {
        let mut content = String::new();
        for block in &api_response.content {
            if let AnthropicContentBlock::Text { text } = block {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(text);
            }
        }
        content
    }
}

/// Appended to the system prompt when a JSON schema is requested, since the
/// Anthropic Messages API has no native structured-output mode in this client.
fn schema_instruction(schema: &serde_json::Value) -> String {
    format!(
        "Respond with a single JSON object only, matching this JSON schema, with no prose \
         before or after it:\n{schema}"
    )
}

#[async_trait::async_trait]
impl LlmClient for AnthropicProvider {
    async fn complete(
        &self,
        mut messages: Vec<Message>,
        json_schema: Option<serde_json::Value>,
        config: Option<RequestConfig>,
    ) -> LlmResult<Completion> {
        if let Some(ref schema) = json_schema {
            messages.push(Message::system(schema_instruction(schema)));
        }

        let request = self.build_request(&messages, config.as_ref());

        log_debug!(
            provider = "anthropic",
            request_json = %serde_json::to_string(&request).unwrap_or_default(),
            "Sending Anthropic request"
        );

        let api_response = self.send_request(request).await?;
        let content = Self::extract_text(&api_response);

        let structured_response = match &json_schema {
            Some(_) => Some(crate::llm::response_parser::ResponseParser::parse_llm_output(
                &content,
            )?),
            None => None,
        };

        Ok(Completion {
            content,
            structured_response,
            usage: Some(TokenUsage {
                prompt_tokens: api_response.usage.input_tokens,
                completion_tokens: api_response.usage.output_tokens,
                total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
            }),
            model: Some(api_response.model),
        })
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}
