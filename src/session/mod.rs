//! Session and conversation transcript management.
//!
//! This module provides in-memory session storage. Each session is an explicit
//! context object carrying one user's transcript, credentials and service
//! handles; it is created when a chat starts and discarded when the chat ends
//! or goes idle.
//!
//! # Architecture
//!
//! - [`Session`]: Represents a single conversation session
//! - [`SessionStore`]: Thread-safe store for all active sessions
//!
//! # Example
//!
//! ```rust
//! use memory_chatbot::session::SessionStore;
//!
//! let store = SessionStore::new();
//! let session = store.create();
//! session.add_user_message("Hello!");
//!
//! let messages = session.transcript();
//! assert_eq!(messages.len(), 1);
//! ```

mod thread;

pub use thread::{ConversationTurn, DEFAULT_SESSION_TIMEOUT, Session, SessionStore};
