//! Prompt construction for completion-style (local) backends.
//!
//! Chat turns are flattened into one text prompt. System turns are emitted
//! with a neutral prefix, user and assistant turns carry distinct tags, and
//! when the conversation ends on a user turn an open assistant tag is appended
//! so the model continues speaking as the assistant.

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Role};

/// Tag vocabulary used when flattening a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptTemplate {
    pub system_prefix: String,
    pub user_tag: String,
    pub assistant_tag: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            system_prefix: String::new(),
            user_tag: "Human:".to_string(),
            assistant_tag: "AI:".to_string(),
        }
    }
}

impl PromptTemplate {
    /// Flatten `messages` into a single prompt string.
    ///
    /// Pure and deterministic: equal inputs always give equal prompts.
    pub fn build_prompt(&self, messages: &[ChatMessage]) -> String {
        let mut prompt = String::new();

        for message in messages {
            let content = message.content.trim();
            let tag = match message.role {
                Role::System => &self.system_prefix,
                Role::User => &self.user_tag,
                Role::Assistant => &self.assistant_tag,
            };
            prompt.push_str(tag);
            prompt.push_str(content);
            prompt.push('\n');
        }

        if messages.last().map(|m| m.role) == Some(Role::User) {
            prompt.push_str(&self.assistant_tag);
        }
        prompt
    }

    /// Whether a prompt built by this template ends with the open assistant marker.
    pub fn ends_with_open_marker(&self, prompt: &str) -> bool {
        !self.assistant_tag.is_empty() && prompt.ends_with(&self.assistant_tag)
    }
}

/// Flatten `messages` with the default template.
pub fn build_prompt(messages: &[ChatMessage]) -> String {
    PromptTemplate::default().build_prompt(messages)
}
