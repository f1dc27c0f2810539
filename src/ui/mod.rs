//! Server-rendered chat page.
//!
//! The page is a single tera template; every value is autoescaped because the
//! template name ends in `.html`.

use serde::Serialize;
use tera::{Context, Tera};

use crate::notice::Notice;
use crate::session::Session;

const CHAT_TEMPLATE: &str = "chat.html";

/// Everything the chat page shows.
#[derive(Debug, Serialize)]
pub struct ChatPage {
    pub session_id: String,
    pub configured: bool,
    pub completion_key_set: bool,
    pub memory_key_set: bool,
    pub warnings: Vec<Notice>,
    pub notices: Vec<Notice>,
    pub transcript: Vec<TurnView>,
    pub memory_count: Option<usize>,
    pub memory_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TurnView {
    pub role: &'static str,
    pub content: String,
}

impl ChatPage {
    /// Snapshot a session. Drains its pending notices.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let credentials = session.credentials();
        let validation = credentials.validate();
        let context = session.last_context();

        Self {
            session_id: session.id().to_string(),
            configured: session.backends().is_some(),
            completion_key_set: !credentials.completion_key.is_empty(),
            memory_key_set: !credentials.memory_key.is_empty(),
            warnings: validation.warnings,
            notices: session.take_notices(),
            transcript: session
                .transcript()
                .into_iter()
                .map(|m| TurnView {
                    role: m.role.as_str(),
                    content: m.content,
                })
                .collect(),
            memory_count: context.as_ref().map(|c| c.record_count),
            memory_context: context.map(|c| c.text),
        }
    }
}

/// Compiled page templates.
#[derive(Debug)]
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(CHAT_TEMPLATE, include_str!("templates/chat.html"))?;
        Ok(Self { tera })
    }

    pub fn render_chat(&self, page: &ChatPage) -> Result<String, tera::Error> {
        let context = Context::from_serialize(page)?;
        self.tera.render(CHAT_TEMPLATE, &context)
    }
}
