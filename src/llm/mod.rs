//! Completion service client.
//!
//! This module wraps an `OpenAI`-compatible Chat Completions endpoint (Groq by
//! default) behind the [`CompletionService`] trait, and builds the
//! memory-aware prompt that every turn sends.
//!
//! # Overview
//!
//! - [`prompt`]: system prompt and two-message exchange construction
//! - [`ChatCompletionsClient`]: non-streaming `/v1/chat/completions` client
//! - [`Provider`]: URL and auth differences between providers
//!
//! # Example
//!
//! ```rust,ignore
//! use memory_chatbot::llm::{ChatCompletionsClient, LlmSettings, respond};
//!
//! let client = ChatCompletionsClient::new(LlmSettings::groq("gsk_..."));
//! let reply = respond(&client, "Hello!", &context).await;
//! ```

pub mod chat_completions;
pub mod prompt;
pub mod provider;

pub use chat_completions::ChatCompletionsClient;
pub use prompt::{build_messages, build_system_prompt};
pub use provider::Provider;

use crate::error::Result;

/// Default completion endpoint (Groq's `OpenAI`-compatible API).
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Default upper bound on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Completion connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the API (e.g., `https://api.groq.com/openai`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Bounded output length.
    pub max_tokens: u32,
    /// Fixed sampling temperature.
    pub temperature: f32,
    /// Provider type (auto-detected from `base_url`).
    pub provider: Provider,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("provider", &self.provider)
            .finish()
    }
}

impl LlmSettings {
    /// Settings for an arbitrary base URL with the default model parameters.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            provider: Provider::detect_from_url(&base_url),
            base_url,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Settings for Groq with the default model parameters.
    #[must_use]
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new(DEFAULT_BASE_URL, Some(api_key.into()))
    }

    /// Point an Azure provider at a deployment. Other providers are unchanged.
    #[must_use]
    pub fn with_azure_deployment(
        mut self,
        deployment_name: Option<String>,
        api_version: Option<String>,
    ) -> Self {
        if let (Provider::AzureOpenAI { .. }, Some(deployment)) = (&self.provider, deployment_name)
        {
            self.provider = Provider::AzureOpenAI {
                deployment_name: deployment,
                api_version: api_version.unwrap_or_else(|| provider::DEFAULT_AZURE_API_VERSION.to_string()),
            };
        }
        self
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A chat completion backend.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Generate one completion for the given exchange and return its text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no choice.
    async fn complete(&self, messages: &[Message]) -> Result<String>;
}

/// Prefix of the reply text synthesized when the completion call fails.
pub const RESPONSE_ERROR_PREFIX: &str = "Error getting response: ";

/// Ask the completion service for a reply to `user_message` given `context`.
///
/// Never fails: a service error is rendered into the reply text itself.
pub async fn respond(service: &dyn CompletionService, user_message: &str, context: &str) -> String {
    let messages = build_messages(context, user_message);

    match service.complete(&messages).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(name: "llm.completion.failed", error = %e, "Completion request failed");
            format!("{RESPONSE_ERROR_PREFIX}{e}")
        }
    }
}
