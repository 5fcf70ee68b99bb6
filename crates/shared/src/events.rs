//! Store keys, change notifications, and panel messaging types.

use serde::{Deserialize, Serialize};

/// Names of the records held in the key-value store
pub mod keys {
    pub const API_KEY: &str = "geminiApiKey";
    pub const CONVERSATION_HISTORY: &str = "conversationHistory";
    pub const UPLOADED_FILES: &str = "uploadedFiles";
    pub const SELECTED_TEXT: &str = "selectedText";
    pub const PENDING_QUESTION: &str = "pendingQuestion";
    pub const TIMESTAMP: &str = "timestamp";

    /// Keys that make up the pending-question handoff record
    pub const PENDING_RECORD: [&str; 3] = [SELECTED_TEXT, PENDING_QUESTION, TIMESTAMP];
}

/// Emitted by a store after every write or removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub keys: Vec<String>,
}

impl StoreChange {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn touches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Whether the pending-question handoff may have changed
    pub fn touches_pending_question(&self) -> bool {
        self.touches(keys::SELECTED_TEXT) || self.touches(keys::PENDING_QUESTION)
    }
}

/// Messages sent from the background side to an open panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PanelMessage {
    /// Ask the panel to submit the given selection as a question
    ProcessSelectedText { text: String },
}

/// Acknowledgment returned by a panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelReply {
    pub success: bool,
}

impl PanelReply {
    pub fn ack() -> Self {
        Self { success: true }
    }
}

/// Durable handoff left for a panel that was not open when text was selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub selected_text: String,
    /// Milliseconds since epoch when the selection was stored
    pub timestamp: i64,
}
