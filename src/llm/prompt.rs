//! Memory-aware prompt construction.

use super::Message;

const PERSONA: &str =
    "You are a helpful, friendly AI assistant with persistent memory capabilities.";

const INSTRUCTIONS: &str = "Instructions:
- Use the memory context above to provide personalized, contextual responses
- Reference previous conversations naturally when relevant
- If you see information about the user's preferences, interests, or past topics, incorporate them
- Be conversational, helpful, and show that you remember our interactions
- If no relevant memory context exists, just respond normally but mention this is our first interaction";

/// System prompt with the memory context block embedded between the persona
/// line and the fixed instructions.
#[must_use]
pub fn build_system_prompt(context: &str) -> String {
    format!("{PERSONA}\n\n{context}\n\n{INSTRUCTIONS}")
}

/// The two-message exchange sent for every turn: system prompt, then the raw
/// user input.
#[must_use]
pub fn build_messages(context: &str, user_message: &str) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(context)),
        Message::user(user_message),
    ]
}
