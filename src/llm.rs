//! Chat-completion client.
//!
//! [`ChatModel`] takes an ordered sequence of role-tagged messages and
//! returns the model's plain-text reply. [`OpenAiChat`] speaks the
//! OpenAI-compatible `POST {base_url}/chat/completions` API; the base URL is
//! configurable so any compatible endpoint works.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Credentials, GenerationConfig};
use crate::error::{Error, Result};
use crate::http::{self, RetryPolicy};
use crate::models::{GenerationResult, Message};

const SERVICE: &str = "openai";

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn chat(&self, messages: &[Message]) -> Result<GenerationResult>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

pub struct OpenAiChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl OpenAiChat {
    /// Fails with [`Error::Connection`] when no API key was found.
    pub fn new(config: &GenerationConfig, credentials: &Credentials) -> Result<Self> {
        let api_key = credentials.openai_api_key.clone().ok_or_else(|| {
            Error::connection(
                SERVICE,
                format!("{} environment variable not set", config.api_key_env),
            )
        })?;

        Ok(Self {
            client: http::client(config.timeout_secs)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: config.retry_policy(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[Message]) -> Result<GenerationResult> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let reply = http::send_with_retry("openai chat", self.retry, || {
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await
        .map_err(|f| f.into_error(SERVICE, Error::Generation))?;

        if !reply.is_success() {
            return Err(http::HttpFailure::Status {
                status: reply.status,
                body: reply.body,
            }
            .into_error(SERVICE, Error::Generation));
        }

        let response: ChatResponse = serde_json::from_str(&reply.body)
            .map_err(|e| Error::Generation(format!("invalid chat response: {}", e)))?;
        parse_chat_response(response, &self.model)
    }
}

fn parse_chat_response(response: ChatResponse, requested_model: &str) -> Result<GenerationResult> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Generation("chat response has no message content".into()))?;

    tracing::debug!(chars = text.len(), "chat completion received");

    Ok(GenerationResult {
        text,
        model: response.model.unwrap_or_else(|| requested_model.to_string()),
        prompt_tokens: response.usage.as_ref().map(|u| u.prompt_tokens),
        completion_tokens: response.usage.as_ref().map(|u| u.completion_tokens),
    })
}
