//! OpenAI provider implementation, built on the shared OpenAI-compatible client.

use super::openai_shared::{
    OpenAiCompatibleClient, OpenAiJsonSchema, OpenAiMessage, OpenAiRequest, OpenAiResponse,
    OpenAiResponseFormat,
};
use crate::llm::config::{DefaultLlmParams, OpenAiConfig};
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::messages::{Message, Role};
use crate::llm::provider::{Completion, LlmClient, RequestConfig, TokenUsage};
use crate::llm::response_parser::ResponseParser;
use crate::logging::log_debug;

/// OpenAI provider implementation.
#[derive(Debug)]
pub struct OpenAiProvider {
    http_client: OpenAiCompatibleClient,
    config: OpenAiConfig,
    default_params: DefaultLlmParams,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider instance.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigurationError`] if the API key is missing.
    pub fn new(config: OpenAiConfig, default_params: DefaultLlmParams) -> LlmResult<Self> {
        if config.api_key.is_none() {
            return Err(LlmError::configuration_error("OpenAI API key is required"));
        }

        log_debug!(
            provider = "openai",
            max_context_tokens = config.max_context_tokens,
            base_url = %config.base_url,
            default_model = %config.default_model,
            "OpenAI provider initialized"
        );

        Ok(Self {
            http_client: OpenAiCompatibleClient::with_retry_policy(config.retry_policy.clone()),
            config,
            default_params,
        })
    }

    fn build_request(
        &self,
        messages: &[Message],
        json_schema: Option<&serde_json::Value>,
        config: Option<&RequestConfig>,
    ) -> OpenAiRequest {
        let openai_messages = messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    Role::System => "system".to_string(),
                    Role::User => "user".to_string(),
                },
                content: m.content.clone(),
            })
            .collect();

        let response_format = json_schema.map(|schema| OpenAiResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: Some(OpenAiJsonSchema {
                name: "structured_response".to_string(),
                schema: schema.clone(),
                strict: Some(true),
            }),
        });

        OpenAiRequest {
            model: self.config.default_model.clone(),
            messages: openai_messages,
            temperature: Some(config.and_then(|c| c.temperature).unwrap_or(self.default_params.temperature)),
            max_tokens: Some(config.and_then(|c| c.max_tokens).unwrap_or(self.default_params.max_tokens)),
            top_p: Some(config.and_then(|c| c.top_p).unwrap_or(self.default_params.top_p)),
            response_format,
        }
    }

    async fn send_request(&self, request: &OpenAiRequest) -> LlmResult<OpenAiResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let headers = OpenAiCompatibleClient::build_auth_headers(
            self.config.api_key.as_deref().unwrap_or_default(),
        )?;
        self.http_client
            .execute_chat_request(&url, &headers, request)
            .await
    }

    fn parse_response(
        &self,
        response: OpenAiResponse,
        json_schema: Option<&serde_json::Value>,
    ) -> LlmResult<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::response_parsing_error("No choices in OpenAI response"))?;

        let content = choice.message.content;

        let structured_response = match json_schema {
            Some(_) => Some(ResponseParser::parse_llm_output(&content)?),
            None => None,
        };

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(Completion {
            content,
            structured_response,
            usage,
            model: Some(self.config.default_model.clone()),
        })
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        json_schema: Option<serde_json::Value>,
        config: Option<RequestConfig>,
    ) -> LlmResult<Completion> {
        let request = self.build_request(&messages, json_schema.as_ref(), config.as_ref());

        log_debug!(
            provider = "openai",
            request_json = %serde_json::to_string(&request).unwrap_or_default(),
            "Sending OpenAI request"
        );

        let response = self.send_request(&request).await?;
        self.parse_response(response, json_schema.as_ref())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
