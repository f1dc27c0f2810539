//! Per-turn chat handling.
//!
//! A turn runs strictly in order: read memory, build the prompt, call the
//! completion service, record the reply, write the exchange back to memory.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::error::Result;
use crate::llm::{self, ChatCompletionsClient, CompletionService, LlmSettings};
use crate::memory::{Mem0Client, MemoryContext, MemoryManager, Recall};
use crate::notice::Notice;
use crate::session::Session;

/// Where and how the external services are reached.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub memory_base_url: String,
    pub completion_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
    pub user_id: String,
    pub request_timeout: Duration,
}

impl ServiceEndpoints {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            memory_base_url: config.memory.base_url.clone(),
            completion_base_url: config.completion.base_url.clone(),
            model: config.completion.model.clone(),
            max_tokens: config.completion.max_tokens,
            temperature: config.completion.temperature,
            azure_deployment: config.completion.azure_deployment.clone(),
            azure_api_version: config.completion.azure_api_version.clone(),
            user_id: config.memory.user_id.clone(),
            request_timeout: Duration::from_secs(config.completion.request_timeout_secs),
        }
    }
}

/// Service handles owned by a configured session.
#[derive(Clone)]
pub struct Backends {
    pub memory: MemoryManager,
    pub completion: Arc<dyn CompletionService>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

/// Result of one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// Assistant reply as displayed; holds the error text if the completion failed.
    pub reply: String,
    /// Number of memories that went into the context.
    pub memory_count: usize,
    pub notices: Vec<Notice>,
}

/// Why a turn was not run.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Credentials are missing or malformed; no service was contacted.
    #[error("chat is not configured")]
    NotConfigured {
        /// Validation warnings to display.
        warnings: Vec<Notice>,
    },
    /// The user message was blank.
    #[error("message is empty")]
    EmptyMessage,
}

/// Builds service clients from credentials and runs turns against sessions.
#[derive(Debug, Clone)]
pub struct ChatService {
    endpoints: ServiceEndpoints,
    http: reqwest::Client,
}

impl ChatService {
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(endpoints.request_timeout)
            .build()?;
        Ok(Self { endpoints, http })
    }

    /// Build service clients for well-formed credentials.
    pub fn connect(&self, credentials: &Credentials) -> Result<Backends> {
        let memory = Mem0Client::with_client(
            self.http.clone(),
            credentials.memory_key.clone(),
            &self.endpoints.memory_base_url,
        )?;

        let mut settings = LlmSettings::new(
            self.endpoints.completion_base_url.clone(),
            Some(credentials.completion_key.clone()),
        )
        .with_azure_deployment(
            self.endpoints.azure_deployment.clone(),
            self.endpoints.azure_api_version.clone(),
        );
        settings.model.clone_from(&self.endpoints.model);
        settings.max_tokens = self.endpoints.max_tokens;
        settings.temperature = self.endpoints.temperature;

        Ok(Backends {
            memory: MemoryManager::new(Arc::new(memory), self.endpoints.user_id.clone()),
            completion: Arc::new(ChatCompletionsClient::with_client(self.http.clone(), settings)),
        })
    }

    /// Store credentials on the session and, when they validate, its service
    /// handles. Returns the notices to display.
    pub fn configure(&self, session: &Session, credentials: Credentials) -> Vec<Notice> {
        let validation = credentials.validate();
        if !validation.is_ready() {
            tracing::info!(
                name: "session.credentials.rejected",
                session_id = %session.id(),
                warnings = validation.warnings.len(),
                "Credentials not usable"
            );
            session.configure(credentials, None);
            return validation.warnings;
        }

        match self.connect(&credentials) {
            Ok(backends) => {
                tracing::info!(
                    name: "session.credentials.accepted",
                    session_id = %session.id(),
                    "Session configured"
                );
                session.configure(credentials, Some(backends));
                vec![Notice::success("API keys configured.")]
            }
            Err(e) => {
                tracing::error!(session_id = %session.id(), error = %e, "Failed to initialize clients");
                session.configure(credentials, None);
                vec![Notice::error(format!(
                    "Failed to initialize one or more clients. Please check your API keys. ({e})"
                ))]
            }
        }
    }

    fn backends(session: &Session) -> std::result::Result<Backends, TurnError> {
        session.backends().ok_or_else(|| TurnError::NotConfigured {
            warnings: session.credentials().validate().warnings,
        })
    }

    /// Run one turn for `message`.
    ///
    /// The exchange is written to memory even when the completion failed, in
    /// which case the reply is the error text.
    pub async fn handle_turn(
        &self,
        session: &Session,
        message: &str,
    ) -> std::result::Result<TurnOutcome, TurnError> {
        let _turn = session.lock_turn().await;
        // Taken under the lock so a turn queued behind a key change uses the new clients.
        let backends = Self::backends(session)?;
        if message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let mut notices = Vec::new();

        session.add_user_message(message);

        let context = backends.memory.context_for_llm().await;
        session.set_last_context(context.clone());
        notices.extend(context.notice);

        let reply = llm::respond(backends.completion.as_ref(), message, &context.text).await;
        session.add_assistant_message(reply.clone());

        notices.push(backends.memory.add_conversation(message, &reply).await);

        tracing::info!(
            name: "chat.turn.complete",
            session_id = %session.id(),
            memory_count = context.record_count,
            reply_length = reply.len(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            reply,
            memory_count: context.record_count,
            notices,
        })
    }

    /// Delete every memory of the session's user.
    ///
    /// On success the session's last context is dropped as well, since it
    /// lists memories that no longer exist.
    pub async fn clear_memories(&self, session: &Session) -> std::result::Result<Notice, TurnError> {
        let backends = Self::backends(session)?;
        let notice = backends.memory.clear().await;
        if !notice.is_error() {
            session.clear_last_context();
        }
        Ok(notice)
    }

    /// Memories matching `query`, or all of them when no query is given.
    pub async fn recall(
        &self,
        session: &Session,
        query: Option<&str>,
    ) -> std::result::Result<Recall, TurnError> {
        let backends = Self::backends(session)?;
        Ok(match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => backends.memory.search_memories(q).await,
            None => backends.memory.all_memories().await,
        })
    }

    /// The context block the next turn would send.
    pub async fn memory_context(
        &self,
        session: &Session,
    ) -> std::result::Result<MemoryContext, TurnError> {
        let backends = Self::backends(session)?;
        let context = backends.memory.context_for_llm().await;
        session.set_last_context(context.clone());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::llm::Message;
    use crate::memory::{MemoryRecord, MemoryService};
    use crate::session::SessionStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stores each added message as a `{"memory": ...}` record.
    #[derive(Default)]
    struct InMemory {
        records: Mutex<Vec<MemoryRecord>>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MemoryService for InMemory {
        async fn add(&self, messages: &[Message], _user_id: &str) -> Result<Vec<MemoryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let added: Vec<MemoryRecord> = messages
                .iter()
                .map(|m| MemoryRecord::new(serde_json::json!({"memory": m.content})))
                .collect();
            self.records.lock().unwrap().extend(added.clone());
            Ok(added)
        }
        async fn get_all(&self, _user_id: &str) -> Result<Vec<MemoryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.lock().unwrap().clone())
        }
        async fn search(&self, query: &str, _user_id: &str) -> Result<Vec<MemoryRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.text().contains(query))
                .cloned()
                .collect())
        }
        async fn delete_all(&self, _user_id: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records.lock().unwrap().clear();
            Ok(())
        }
    }

    /// Answers with a fixed reply, or fails when `reply` is `None`.
    struct Scripted {
        reply: Option<&'static str>,
        calls: AtomicUsize,
        last_system: Mutex<String>,
    }

    impl Scripted {
        fn new(reply: Option<&'static str>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                last_system: Mutex::new(String::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl CompletionService for Scripted {
        async fn complete(&self, messages: &[Message]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_system.lock().unwrap() = messages[0].content.clone();
            self.reply.map(ToString::to_string).ok_or(Error::Api {
                status: 503,
                message: "overloaded".to_string(),
            })
        }
    }

    fn service() -> ChatService {
        ChatService::new(ServiceEndpoints::from_config(&AppConfig::default())).unwrap()
    }

    fn attach(session: &Session, memory: Arc<InMemory>, completion: Arc<Scripted>) {
        session.configure(
            Credentials::new("gsk_test", "m0-test"),
            Some(Backends {
                memory: MemoryManager::new(memory, "default_user"),
                completion,
            }),
        );
    }

    #[tokio::test]
    async fn test_turn_flow_and_round_trip() {
        let chat = service();
        let session = SessionStore::new().create();
        let memory = Arc::new(InMemory::default());
        let completion = Arc::new(Scripted::new(Some("Nice to meet you, Ada!")));
        attach(&session, Arc::clone(&memory), Arc::clone(&completion));

        let first = chat.handle_turn(&session, "My name is Ada").await.unwrap();
        assert_eq!(first.reply, "Nice to meet you, Ada!");
        assert_eq!(first.memory_count, 0);
        assert!(
            completion
                .last_system
                .lock()
                .unwrap()
                .contains("No previous conversations found.")
        );
        assert_eq!(
            first.notices.last().unwrap().text,
            "Memory saved: 2 items stored"
        );

        let second = chat.handle_turn(&session, "What is my name?").await.unwrap();
        assert_eq!(second.memory_count, 2);
        let system = completion.last_system.lock().unwrap().clone();
        assert!(system.contains("1. My name is Ada\n"));
        assert!(system.contains("2. Nice to meet you, Ada!\n"));
        let last = session.last_context().unwrap();
        assert_eq!(last.record_count, 2);
        assert!(last.text.contains("1. My name is Ada"));

        assert_eq!(session.message_count(), 4);
    }

    #[tokio::test]
    async fn test_completion_failure_is_displayed_and_still_stored() {
        let chat = service();
        let session = SessionStore::new().create();
        let memory = Arc::new(InMemory::default());
        attach(&session, Arc::clone(&memory), Arc::new(Scripted::new(None)));

        let outcome = chat.handle_turn(&session, "hello").await.unwrap();
        assert_eq!(
            outcome.reply,
            "Error getting response: API error (503): overloaded"
        );

        let transcript = session.transcript();
        assert_eq!(transcript[1].content, outcome.reply);

        let stored = memory.records.lock().unwrap().clone();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].text(), outcome.reply);
    }

    #[tokio::test]
    async fn test_unconfigured_session_makes_no_calls() {
        let chat = service();
        let session = SessionStore::new().create();

        let notices = chat.configure(&session, Credentials::new("sk-wrong", "m0-ok"));
        assert!(notices.iter().any(|n| n.text.contains("starts with gsk_")));
        assert!(session.backends().is_none());

        match chat.handle_turn(&session, "hello").await {
            Err(TurnError::NotConfigured { warnings }) => {
                assert!(warnings.iter().any(|n| n.text.contains("starts with gsk_")));
            }
            other => panic!("expected NotConfigured, got {other:?}"),
        }
        assert_eq!(session.message_count(), 0);
        assert!(matches!(
            chat.clear_memories(&session).await,
            Err(TurnError::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn test_valid_credentials_connect() {
        let chat = service();
        let session = SessionStore::new().create();

        let notices = chat.configure(&session, Credentials::new("gsk_test", "m0-test"));
        assert_eq!(notices, vec![Notice::success("API keys configured.")]);
        let backends = session.backends().unwrap();
        assert_eq!(backends.memory.user_id(), "default_user");
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let chat = service();
        let session = SessionStore::new().create();
        let memory = Arc::new(InMemory::default());
        let completion = Arc::new(Scripted::new(Some("unused")));
        attach(&session, Arc::clone(&memory), Arc::clone(&completion));

        assert!(matches!(
            chat.handle_turn(&session, "   ").await,
            Err(TurnError::EmptyMessage)
        ));
        assert_eq!(memory.calls.load(Ordering::SeqCst), 0);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recall_and_clear() {
        let chat = service();
        let session = SessionStore::new().create();
        let memory = Arc::new(InMemory::default());
        attach(&session, Arc::clone(&memory), Arc::new(Scripted::new(Some("ok"))));

        chat.handle_turn(&session, "I love green tea").await.unwrap();

        let hits = chat.recall(&session, Some("tea")).await.unwrap();
        assert_eq!(hits.records.len(), 1);
        let all = chat.recall(&session, Some("  ")).await.unwrap();
        assert_eq!(all.records.len(), 2);

        let notice = chat.clear_memories(&session).await.unwrap();
        assert_eq!(notice.text, "All memories cleared!");
        let ctx = chat.memory_context(&session).await.unwrap();
        assert_eq!(ctx.record_count, 0);
    }

    #[tokio::test]
    async fn test_clear_drops_displayed_context() {
        let chat = service();
        let session = SessionStore::new().create();
        let memory = Arc::new(InMemory::default());
        attach(&session, Arc::clone(&memory), Arc::new(Scripted::new(Some("Noted."))));

        chat.handle_turn(&session, "I love green tea").await.unwrap();
        chat.handle_turn(&session, "And oolong").await.unwrap();
        assert_eq!(crate::ui::ChatPage::from_session(&session).memory_count, Some(2));

        let notice = chat.clear_memories(&session).await.unwrap();
        assert_eq!(notice.text, "All memories cleared!");
        session.push_notices([notice]);

        let page = crate::ui::ChatPage::from_session(&session);
        assert_eq!(page.memory_count, None);
        assert_eq!(page.memory_context, None);
        let html = crate::ui::Templates::new().unwrap().render_chat(&page).unwrap();
        assert!(html.contains("All memories cleared!"));
        assert!(!html.contains("Retrieved 2 memories"));
        assert!(!html.contains("1. I love green tea"));
    }

    #[tokio::test]
    async fn test_queued_turn_uses_clients_configured_while_waiting() {
        let chat = service();
        let session = SessionStore::new().create();
        let stale = Arc::new(Scripted::new(Some("stale")));
        attach(&session, Arc::new(InMemory::default()), Arc::clone(&stale));

        let held = session.clone();
        let guard = held.lock_turn().await;
        let turn = tokio::spawn({
            let chat = chat.clone();
            let session = session.clone();
            async move { chat.handle_turn(&session, "hello").await }
        });
        // Let the turn start and block on the lock.
        tokio::task::yield_now().await;

        let fresh = Arc::new(Scripted::new(Some("fresh")));
        attach(&session, Arc::new(InMemory::default()), Arc::clone(&fresh));
        drop(guard);

        let outcome = turn.await.unwrap().unwrap();
        assert_eq!(outcome.reply, "fresh");
        assert_eq!(stale.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fresh.calls.load(Ordering::SeqCst), 1);
    }
}
