//! OpenAI-compatible API client.

use super::request::{OpenAIMessage, OpenAIRequest};
use super::response::OpenAIResponse;
use crate::provider::client::LlmApi;
use crate::provider::error::Error;
use crate::provider::http::{AuthConfig, HttpClient};
use crate::provider::types::{ChatRequest, Completion, FinishReason, Usage};
use async_trait::async_trait;
use std::time::Duration;

/// Native OpenAI-compatible API client.
#[derive(Debug)]
pub struct OpenAICompatClient {
    http: HttpClient,
}

impl OpenAICompatClient {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: impl Into<String>, auth: AuthConfig, timeout: Duration) -> Self {
        Self {
            http: HttpClient::new(base_url, auth, timeout),
        }
    }

    /// Build an OpenAI-compatible request.
    fn build_request(request: &ChatRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref()
            && !system.is_empty()
        {
            messages.push(OpenAIMessage::system(system));
        }
        messages.push(OpenAIMessage::user(request.prompt.clone()));

        OpenAIRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    fn convert_response(response: OpenAIResponse) -> Result<Completion, Error> {
        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmptyResponse(format!("no choices in {}", response.id)))?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
            usage,
        })
    }
}

#[async_trait]
impl LlmApi for OpenAICompatClient {
    fn id(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, request: ChatRequest) -> Result<Completion, Error> {
        let api_request = Self::build_request(&request);

        tracing::debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            prompt_chars = request.prompt.len(),
            max_tokens = ?api_request.max_tokens,
            "OpenAI-compat API request"
        );

        let response: OpenAIResponse = self
            .http
            .post_json("/chat/completions", &api_request)
            .await?;

        Self::convert_response(response)
    }
}
