//! OpenAI Chat Completions API client.
//!
//! This module implements [`CompletionService`] for the Chat Completions API
//! (`/v1/chat/completions`) as a single non-streaming request per turn.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ensure_success};

use super::{CompletionService, LlmSettings, Message};

/// Request body for `/v1/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsClient {
    /// Create a new client with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Create a new client reusing an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, settings: LlmSettings) -> Self {
        Self { http, settings }
    }
}

#[async_trait::async_trait]
impl CompletionService for ChatCompletionsClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);

        let body = ChatRequest {
            model: &self.settings.model,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        tracing::debug!(
            url = %url,
            provider = self.settings.provider.name(),
            model = %self.settings.model,
            message_count = messages.len(),
            "Sending chat completion request"
        );

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = if self.settings.provider.uses_api_key_header() {
                rb.header("api-key", k)
            } else {
                rb.bearer_auth(k)
            };
        }

        let resp = ensure_success(rb.send().await?).await?;
        let parsed: ChatResponse = resp.json().await?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(crate::error::Error::MissingChoice)?;
        let content = choice.message.content.unwrap_or_default();

        tracing::debug!(content_length = content.len(), "Chat completion received");
        Ok(content)
    }
}
