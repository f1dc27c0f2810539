//! Memory Chatbot
//!
//! A chat assistant that remembers earlier conversations by storing every
//! exchange in a hosted memory service and replaying those memories into the
//! system prompt of each completion request.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with a server-rendered chat page and a JSON API
//! - **Memory**: Mem0 REST adapter, context assembly and the memory writer
//! - **LLM**: OpenAI-compatible Chat Completions client (Groq by default)
//! - **Sessions**: Per-visitor transcript, credentials and service handles
//!
//! # Modules
//!
//! - [`chat`]: Turn handling across memory and completion services
//! - [`llm`]: Completion client, providers and prompt construction
//! - [`memory`]: Memory service trait, Mem0 client and context assembly
//! - [`session`]: Conversation and session management

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::assigning_clones)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::unused_async)]

pub mod chat;
pub mod config;
pub mod credentials;
pub mod error;
pub mod llm;
pub mod memory;
pub mod notice;
pub mod server;
pub mod session;
pub mod ui;

use std::sync::Arc;

use tracing::info;

use crate::chat::{ChatService, ServiceEndpoints};
use crate::config::AppConfig;
use crate::credentials::Credentials;
use crate::session::{Session, SessionStore};
use crate::ui::Templates;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Builds service clients and runs turns.
    pub chat: Arc<ChatService>,
    /// Session store for conversation management.
    pub sessions: SessionStore,
    /// Global Configuration
    pub config: Arc<AppConfig>,
    /// Compiled page templates.
    pub templates: Arc<Templates>,
    /// Keys new sessions start with; taken from the environment.
    pub default_credentials: Credentials,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, default_credentials: Credentials) -> anyhow::Result<Self> {
        let chat = ChatService::new(ServiceEndpoints::from_config(&config))?;
        Ok(Self {
            chat: Arc::new(chat),
            sessions: SessionStore::new(),
            config,
            templates: Arc::new(Templates::new()?),
            default_credentials,
        })
    }

    /// Create a session and apply `credentials` unless both keys are blank.
    pub fn start_session(&self, credentials: Credentials) -> Session {
        let session = self.sessions.create();
        if !credentials.is_empty() {
            let notices = self.chat.configure(&session, credentials);
            session.push_notices(notices.into_iter().filter(|n| !n.is_warning()));
        }
        info!(
            name: "session.started",
            session_id = %session.id(),
            configured = session.backends().is_some(),
            "Session started"
        );
        session
    }
}
