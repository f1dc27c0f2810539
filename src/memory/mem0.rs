//! REST client for the Mem0 platform API.

use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::{MemoryRecord, MemoryService, records_from_value};
use crate::error::{Result, ensure_success};
use crate::llm::Message;

/// Default Mem0 platform endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mem0.ai";

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    messages: &'a [Message],
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    user_id: &'a str,
}

/// Mem0 client authenticated with a `Token` API key.
#[derive(Clone)]
pub struct Mem0Client {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl std::fmt::Debug for Mem0Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mem0Client")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Mem0Client {
    /// Create a client for `base_url`.
    pub fn new(api_key: impl Into<String>, base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), api_key, base_url)
    }

    /// Create a client reusing an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl AsRef<str>,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url.as_ref())?;
        // Url::join replaces the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.api_key))
    }

    async fn send_for_records(&self, rb: reqwest::RequestBuilder) -> Result<Vec<MemoryRecord>> {
        let resp = ensure_success(rb.send().await?).await?;
        let body: Value = resp.json().await?;
        Ok(records_from_value(body))
    }
}

#[async_trait::async_trait]
impl MemoryService for Mem0Client {
    async fn add(&self, messages: &[Message], user_id: &str) -> Result<Vec<MemoryRecord>> {
        tracing::debug!(user_id = %user_id, message_count = messages.len(), "Adding memories");
        let rb = self
            .request(reqwest::Method::POST, self.url("v1/memories/")?)
            .json(&AddRequest { messages, user_id });
        self.send_for_records(rb).await
    }

    async fn get_all(&self, user_id: &str) -> Result<Vec<MemoryRecord>> {
        tracing::debug!(user_id = %user_id, "Fetching all memories");
        let rb = self
            .request(reqwest::Method::GET, self.url("v1/memories/")?)
            .query(&[("user_id", user_id)]);
        self.send_for_records(rb).await
    }

    async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryRecord>> {
        tracing::debug!(user_id = %user_id, query_length = query.len(), "Searching memories");
        let rb = self
            .request(reqwest::Method::POST, self.url("v1/memories/search/")?)
            .json(&SearchRequest { query, user_id });
        self.send_for_records(rb).await
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        tracing::debug!(user_id = %user_id, "Deleting all memories");
        let rb = self
            .request(reqwest::Method::DELETE, self.url("v1/memories/")?)
            .query(&[("user_id", user_id)]);
        ensure_success(rb.send().await?).await?;
        Ok(())
    }
}
