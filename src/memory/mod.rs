//! Memory service access and context assembly.
//!
//! Stored memories are opaque JSON records owned by the remote service. This
//! module only knows how to pull text out of them, how to linearize them into
//! a prompt block, and how to talk to the service.
//!
//! - [`context`]: the context block injected into the system prompt
//! - [`mem0`]: REST client for the Mem0 platform
//! - [`manager`]: per-session handle bound to one user id

pub mod context;
pub mod manager;
pub mod mem0;

pub use context::{MemoryContext, assemble_context};
pub use manager::{DEFAULT_USER_ID, MemoryManager, Recall};
pub use mem0::Mem0Client;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::llm::Message;

/// Record fields that may carry the memory text, in lookup order.
pub const TEXT_FIELDS: [&str; 4] = ["memory", "content", "text", "data"];

/// A memory as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryRecord(Value);

impl MemoryRecord {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Best-effort text of this record, see [`record_text`].
    #[must_use]
    pub fn text(&self) -> String {
        record_text(self)
    }
}

impl From<Value> for MemoryRecord {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Text of a memory record.
///
/// Objects are searched for the first non-empty value among [`TEXT_FIELDS`];
/// string values are used as-is, other values as their JSON text. When no
/// field qualifies the whole record is stringified. A bare string record is
/// returned unchanged.
#[must_use]
pub fn record_text(record: &MemoryRecord) -> String {
    match &record.0 {
        Value::Object(map) => TEXT_FIELDS
            .iter()
            .find_map(|key| map.get(*key).and_then(field_text))
            .unwrap_or_else(|| record.0.to_string()),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `None` for empty-ish values (null, false, zero, empty string/array/object).
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// Collect records from a list response.
///
/// Accepts a bare array or an object with a `results` array. Anything else
/// yields no records.
#[must_use]
pub fn records_from_value(value: Value) -> Vec<MemoryRecord> {
    match value {
        Value::Array(items) => items.into_iter().map(MemoryRecord).collect(),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items.into_iter().map(MemoryRecord).collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// A remote memory store keyed by user id.
#[async_trait::async_trait]
pub trait MemoryService: Send + Sync {
    /// Submit role-tagged messages for extraction and storage.
    ///
    /// Returns the records the service reports as stored.
    async fn add(&self, messages: &[Message], user_id: &str) -> Result<Vec<MemoryRecord>>;

    /// All memories stored for `user_id`.
    async fn get_all(&self, user_id: &str) -> Result<Vec<MemoryRecord>>;

    /// Memories for `user_id` related to `query`.
    async fn search(&self, query: &str, user_id: &str) -> Result<Vec<MemoryRecord>>;

    /// Delete every memory stored for `user_id`.
    async fn delete_all(&self, user_id: &str) -> Result<()>;
}
