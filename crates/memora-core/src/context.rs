//! Prompt assembly for a conversation turn.
//!
//! Produces the ordered message list sent to the model: a system
//! instruction (with retrieved memories enumerated verbatim when any
//! exist), the trailing session history window, then the new user turn.

use memora_types::llm::ChatMessage;

/// Default assistant persona used when none is configured.
pub const DEFAULT_PERSONA: &str =
    "You are a helpful assistant that remembers the user's preferences and prior conversations.";

/// Builds per-turn message lists from a fixed persona.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    persona: String,
}

impl ContextBuilder {
    pub fn new(persona: impl Into<String>) -> Self {
        let persona = persona.into();
        Self {
            persona: if persona.is_empty() {
                DEFAULT_PERSONA.to_string()
            } else {
                persona
            },
        }
    }

    /// Assemble the message list for one turn.
    ///
    /// When `memories` is empty the system instruction is the bare
    /// persona -- no empty enumeration section is emitted.
    pub fn build(
        &self,
        user_message: &str,
        memories: &[String],
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let mut system = self.persona.clone();
        if !memories.is_empty() {
            let bullets = memories
                .iter()
                .map(|memory| format!("- {memory}"))
                .collect::<Vec<_>>()
                .join("\n");
            system.push_str(
                "\n\nRelevant things you remember about this user:\n",
            );
            system.push_str(&bullets);
            system.push_str(
                "\n\nUse these memories when replying, giving weight to the user's stated preferences and interests.",
            );
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(user_message));
        messages
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA)
    }
}
