//! Conversation history: the bounded, ordered list of user/model turns.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of turns kept; older turns are dropped first
pub const HISTORY_LIMIT: usize = 20;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    /// Label shown in front of a turn in the panel
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You:",
            Role::Model => "AI:",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// Owned history aggregate.
///
/// Serializes transparently as the list of turns, matching the
/// `conversationHistory` store record. Pairing of user/model turns is not
/// enforced: truncation and deletion may leave a model turn without the
/// question that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    messages: Vec<HistoryMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<HistoryMessage>) -> Self {
        let mut history = Self { messages };
        history.enforce_limit();
        history
    }

    /// Append a turn, then drop the oldest turns beyond [`HISTORY_LIMIT`]
    pub fn push(&mut self, message: HistoryMessage) {
        self.messages.push(message);
        self.enforce_limit();
    }

    /// Remove the turn at `index`; out-of-range indexes leave history untouched
    pub fn delete_at(&mut self, index: usize) -> Option<HistoryMessage> {
        if index < self.messages.len() {
            Some(self.messages.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[HistoryMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&HistoryMessage> {
        self.messages.last()
    }

    pub fn into_messages(self) -> Vec<HistoryMessage> {
        self.messages
    }

    fn enforce_limit(&mut self) {
        if self.messages.len() > HISTORY_LIMIT {
            let excess = self.messages.len() - HISTORY_LIMIT;
            self.messages.drain(..excess);
        }
    }
}
