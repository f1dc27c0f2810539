//! API key handling and format validation.
//!
//! Keys are only checked by prefix. A session whose keys do not pass
//! [`Credentials::validate`] never reaches either external service.

use crate::notice::Notice;

/// Required prefix of a Groq completion key.
pub const COMPLETION_KEY_PREFIX: &str = "gsk_";

/// Required prefix of a Mem0 memory key.
pub const MEMORY_KEY_PREFIX: &str = "m0-";

pub const INVALID_COMPLETION_KEY: &str = "Enter a valid Groq API key (starts with gsk_)";
pub const INVALID_MEMORY_KEY: &str = "Enter a valid Mem0 API key (starts with m0-)";
pub const NOT_CONFIGURED: &str = "Please configure both API keys in the sidebar to start chatting.";

/// The two service keys of a session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Completion service (Groq) key.
    pub completion_key: String,
    /// Memory service (Mem0) key.
    pub memory_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("completion_key", &redact(&self.completion_key))
            .field("memory_key", &redact(&self.memory_key))
            .finish()
    }
}

fn redact(key: &str) -> &'static str {
    if key.is_empty() { "<unset>" } else { "<redacted>" }
}

/// Outcome of [`Credentials::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Warnings to display; empty only when the session is ready.
    pub warnings: Vec<Notice>,
    ready: bool,
}

impl Validation {
    /// Both keys are present and well-formed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

impl Credentials {
    #[must_use]
    pub fn new(completion_key: impl Into<String>, memory_key: impl Into<String>) -> Self {
        Self {
            completion_key: completion_key.into().trim().to_string(),
            memory_key: memory_key.into().trim().to_string(),
        }
    }

    /// Keys from `GROQ_API_KEY` and `MEM0_API_KEY`, empty when unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("GROQ_API_KEY").unwrap_or_default(),
            std::env::var("MEM0_API_KEY").unwrap_or_default(),
        )
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completion_key.is_empty() && self.memory_key.is_empty()
    }

    /// Check both keys by prefix.
    ///
    /// A key that is present but malformed produces its own warning. Unless
    /// both keys are present and well-formed, the "configure both keys"
    /// warning is appended as well.
    #[must_use]
    pub fn validate(&self) -> Validation {
        let mut warnings = Vec::new();

        let completion_ok = self.completion_key.starts_with(COMPLETION_KEY_PREFIX);
        if !self.completion_key.is_empty() && !completion_ok {
            warnings.push(Notice::warning(INVALID_COMPLETION_KEY));
        }

        let memory_ok = self.memory_key.starts_with(MEMORY_KEY_PREFIX);
        if !self.memory_key.is_empty() && !memory_ok {
            warnings.push(Notice::warning(INVALID_MEMORY_KEY));
        }

        let ready = completion_ok && memory_ok;
        if !ready {
            warnings.push(Notice::warning(NOT_CONFIGURED));
        }

        Validation { warnings, ready }
    }
}
