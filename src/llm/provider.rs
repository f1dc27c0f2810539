//! Completion provider detection.
//!
//! Providers differ only in where the chat endpoint lives and how the key is
//! sent; the request and response bodies are the same everywhere.

/// Azure API version used when none is configured.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-08-01-preview";

/// Where completion requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Groq's `OpenAI`-compatible endpoint (groq.com)
    Groq,
    /// Azure `OpenAI` Service; addressed by deployment, not model.
    AzureOpenAI {
        deployment_name: String,
        api_version: String,
    },
    /// Any other `OpenAI`-compatible server, including local mocks.
    Compatible,
}

impl Provider {
    /// Detect the provider from a base URL.
    ///
    /// ```rust
    /// use memory_chatbot::llm::Provider;
    ///
    /// assert_eq!(Provider::detect_from_url("https://api.groq.com/openai"), Provider::Groq);
    /// assert_eq!(Provider::detect_from_url("http://localhost:8080"), Provider::Compatible);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let host = url::Url::parse(base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();

        if host.ends_with(".azure.com") {
            Self::AzureOpenAI {
                deployment_name: String::new(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        } else if host == "groq.com" || host.ends_with(".groq.com") {
            Self::Groq
        } else {
            Self::Compatible
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::AzureOpenAI { .. } => "azure",
            Self::Compatible => "openai-compatible",
        }
    }

    /// Full chat completions URL under `base_url`; a trailing slash is ignored.
    #[must_use]
    pub fn build_chat_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::AzureOpenAI {
                deployment_name,
                api_version,
            } => format!(
                "{base}/openai/deployments/{deployment_name}/chat/completions?api-version={api_version}"
            ),
            Self::Groq | Self::Compatible => format!("{base}/v1/chat/completions"),
        }
    }

    /// Azure authenticates with an `api-key` header instead of a bearer token.
    #[must_use]
    pub fn uses_api_key_header(&self) -> bool {
        matches!(self, Self::AzureOpenAI { .. })
    }
}
