//! Context block assembly.
//!
//! The block is opaque prompt material: it is never parsed back. No
//! deduplication, ranking or truncation happens here, so the block grows with
//! the number of stored memories.

use std::fmt::Write;

use super::{MemoryRecord, record_text};
use crate::notice::Notice;

pub const CONTEXT_HEADER: &str = "=== PERSISTENT MEMORY CONTEXT ===\n";
pub const CONTEXT_INTRO: &str = "Here's what I remember about our previous conversations:\n\n";
pub const CONTEXT_FOOTER: &str = "\nUse this context to provide personalized responses.\n\n";

/// Context used when the user has no stored memories.
pub const EMPTY_CONTEXT: &str =
    "=== PERSISTENT MEMORY CONTEXT ===\nNo previous conversations found.\n\n";

/// Context used when the memory read failed.
pub const UNAVAILABLE_CONTEXT: &str =
    "=== PERSISTENT MEMORY CONTEXT ===\nError retrieving memories.\n\n";

/// Linearize records into the context block: header, one numbered line per
/// record in service order, trailing instruction.
#[must_use]
pub fn assemble_context(records: &[MemoryRecord]) -> String {
    if records.is_empty() {
        return EMPTY_CONTEXT.to_string();
    }

    let mut context = String::from(CONTEXT_HEADER);
    context.push_str(CONTEXT_INTRO);
    for (i, record) in records.iter().enumerate() {
        let _ = writeln!(context, "{}. {}", i + 1, record_text(record));
    }
    context.push_str(CONTEXT_FOOTER);
    context
}

/// A context block together with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContext {
    /// Text to embed in the system prompt.
    pub text: String,
    /// Number of records that went into `text`.
    pub record_count: usize,
    /// Set when the memory read failed.
    pub notice: Option<Notice>,
}

impl MemoryContext {
    #[must_use]
    pub fn from_records(records: &[MemoryRecord]) -> Self {
        Self {
            text: assemble_context(records),
            record_count: records.len(),
            notice: None,
        }
    }

    #[must_use]
    pub fn unavailable(notice: Notice) -> Self {
        Self {
            text: UNAVAILABLE_CONTEXT.to_string(),
            record_count: 0,
            notice: Some(notice),
        }
    }
}
