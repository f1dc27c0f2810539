//! Per-session memory handle.

use std::sync::Arc;

use super::{MemoryContext, MemoryRecord, MemoryService};
use crate::llm::Message;
use crate::notice::Notice;

/// User id under which the conversation is stored when none is configured.
pub const DEFAULT_USER_ID: &str = "default_user";

/// Records fetched from the memory service, or the reason there are none.
#[derive(Debug, Clone, Default)]
pub struct Recall {
    pub records: Vec<MemoryRecord>,
    pub notice: Option<Notice>,
}

/// A memory service bound to one user id.
///
/// Every operation reports failures as a [`Notice`] instead of an error so a
/// turn never aborts on a memory problem.
#[derive(Clone)]
pub struct MemoryManager {
    service: Arc<dyn MemoryService>,
    user_id: String,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl MemoryManager {
    #[must_use]
    pub fn new(service: Arc<dyn MemoryService>, user_id: impl Into<String>) -> Self {
        Self {
            service,
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Fetch all memories and assemble the context block.
    ///
    /// A failed read degrades to the record-free "unavailable" context.
    pub async fn context_for_llm(&self) -> MemoryContext {
        match self.service.get_all(&self.user_id).await {
            Ok(records) => {
                tracing::info!(
                    name: "memory.context.loaded",
                    user_id = %self.user_id,
                    record_count = records.len(),
                    "Retrieved memories"
                );
                MemoryContext::from_records(&records)
            }
            Err(e) => {
                tracing::error!(name: "memory.context.failed", error = %e, "Error retrieving memories");
                MemoryContext::unavailable(Notice::error(format!("Error retrieving from Mem0: {e}")))
            }
        }
    }

    /// Store one exchange as an ordered user/assistant pair.
    pub async fn add_conversation(&self, user_message: &str, bot_response: &str) -> Notice {
        let messages = [Message::user(user_message), Message::assistant(bot_response)];

        match self.service.add(&messages, &self.user_id).await {
            Ok(stored) => {
                tracing::info!(
                    name: "memory.saved",
                    user_id = %self.user_id,
                    stored = stored.len(),
                    "Conversation saved to memory"
                );
                Notice::success(format!("Memory saved: {} items stored", stored.len()))
            }
            Err(e) => {
                tracing::error!(name: "memory.save.failed", error = %e, "Error saving to memory");
                Notice::error(format!("Error saving to Mem0: {e}"))
            }
        }
    }

    /// Memories related to `query`; empty on failure.
    pub async fn search_memories(&self, query: &str) -> Recall {
        match self.service.search(query, &self.user_id).await {
            Ok(records) => Recall {
                records,
                notice: None,
            },
            Err(e) => {
                tracing::error!(name: "memory.search.failed", error = %e, "Error searching memories");
                Recall {
                    records: Vec::new(),
                    notice: Some(Notice::error(format!("Error searching memories: {e}"))),
                }
            }
        }
    }

    /// Every stored memory; empty on failure.
    pub async fn all_memories(&self) -> Recall {
        match self.service.get_all(&self.user_id).await {
            Ok(records) => Recall {
                records,
                notice: None,
            },
            Err(e) => Recall {
                records: Vec::new(),
                notice: Some(Notice::error(format!("Error retrieving from Mem0: {e}"))),
            },
        }
    }

    /// Delete every memory of this user.
    pub async fn clear(&self) -> Notice {
        match self.service.delete_all(&self.user_id).await {
            Ok(()) => {
                tracing::info!(name: "memory.cleared", user_id = %self.user_id, "All memories cleared");
                Notice::success("All memories cleared!")
            }
            Err(e) => {
                tracing::error!(name: "memory.clear.failed", error = %e, "Error clearing memories");
                Notice::error(format!("Error clearing memories: {e}"))
            }
        }
    }
}
