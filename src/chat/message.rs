// src/chat/message.rs — Display-ready chat messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// True while deltas are still being appended.
    pub streaming: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into(), false)
    }

    /// An empty assistant message that deltas will be appended to.
    pub fn assistant_streaming() -> Self {
        Self::new(Role::Assistant, String::new(), true)
    }

    fn new(role: Role, content: String, streaming: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            created_at: Utc::now(),
            streaming,
        }
    }
}

/// What the update callback receives: the full list plus the loading flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatUpdate {
    pub messages: Vec<Message>,
    pub loading: bool,
}

impl ChatUpdate {
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}
