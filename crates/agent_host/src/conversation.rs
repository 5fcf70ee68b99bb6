//! Conversation assembly.
//!
//! Turns a question, the attached context items and the stored history into
//! a `generateContent` request, and keeps the bounded history record in the
//! store up to date. History is re-read from the store at the start of every
//! operation; the store is the authority.

use anyhow::{bail, Context, Result};
use providers::gemini::{GeminiContent, GenerateRequest};
use services::{KeyValueStore, StoreExt};
use shared::events::keys;
use shared::history::{History, HistoryMessage, Role};
use shared::ContextItem;
use std::sync::Arc;

/// Opening line of a context preamble
pub const CONTEXT_INTRO: &str = "Here is some context that might help answer the question:\n\n";

/// Closing instruction of a context preamble
pub const CONTEXT_OUTRO: &str =
    "Based on the above context and our conversation history, please answer the following question:\n\n";

/// Model turn that follows the preamble
pub const CONTEXT_ACK: &str = "I'll help you answer based on this context.";

/// Build the context preamble; `None` when there is nothing attached
pub fn context_preamble(items: &[ContextItem]) -> Option<String> {
    if items.is_empty() {
        return None;
    }

    let mut text = String::from(CONTEXT_INTRO);
    for item in items {
        text.push_str(&item.preamble_block());
    }
    text.push_str(CONTEXT_OUTRO);
    Some(text)
}

/// Order the turns sent to the endpoint:
/// preamble exchange, prior history, then the raw question.
pub fn assemble_contents(
    preamble: Option<&str>,
    prior: &[HistoryMessage],
    question: &str,
) -> Vec<GeminiContent> {
    let mut contents = Vec::with_capacity(prior.len() + 3);

    if let Some(preamble) = preamble {
        contents.push(GeminiContent::text(Role::User, preamble));
        contents.push(GeminiContent::text(Role::Model, CONTEXT_ACK));
    }

    contents.extend(
        prior
            .iter()
            .map(|m| GeminiContent::text(m.role, m.content.as_str())),
    );

    contents.push(GeminiContent::text(Role::User, question));

    contents
}

/// Maintains the `conversationHistory` record and builds requests from it
#[derive(Clone)]
pub struct ConversationAssembler {
    store: Arc<dyn KeyValueStore>,
}

impl ConversationAssembler {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Fresh copy of the stored history
    pub async fn history(&self) -> Result<History> {
        let messages: Option<Vec<HistoryMessage>> = self
            .store
            .get_as(keys::CONVERSATION_HISTORY)
            .await
            .context("Failed to load conversation history")?;
        Ok(History::from_messages(messages.unwrap_or_default()))
    }

    async fn save(&self, history: &History) -> Result<()> {
        self.store
            .set_as(keys::CONVERSATION_HISTORY, history)
            .await
            .context("Failed to save conversation history")?;
        tracing::debug!(turns = history.len(), "saved conversation history");
        Ok(())
    }

    async fn append(&self, message: HistoryMessage) -> Result<History> {
        let mut history = self.history().await?;
        history.push(message);
        self.save(&history).await?;
        Ok(history)
    }

    /// Record the question as a user turn and build the request for it.
    ///
    /// The user turn stays in history even if the request later fails.
    pub async fn build_request(
        &self,
        question: &str,
        context_items: &[ContextItem],
    ) -> Result<GenerateRequest> {
        if question.trim().is_empty() {
            bail!("Question is empty");
        }

        let history = self.append(HistoryMessage::user(question)).await?;
        let prior = &history.messages()[..history.len() - 1];

        let preamble = context_preamble(context_items);
        let contents = assemble_contents(preamble.as_deref(), prior, question);
        tracing::debug!(
            turns = contents.len(),
            context_items = context_items.len(),
            "assembled request"
        );

        Ok(GenerateRequest { contents })
    }

    /// Record a successful answer as a model turn
    pub async fn record_answer(&self, answer: &str) -> Result<()> {
        self.append(HistoryMessage::model(answer)).await?;
        Ok(())
    }

    /// Delete one turn by position; `false` when the index is out of range
    pub async fn delete_at(&self, index: usize) -> Result<bool> {
        let mut history = self.history().await?;
        if history.delete_at(index).is_none() {
            tracing::debug!(index, len = history.len(), "history delete out of range");
            return Ok(false);
        }
        self.save(&history).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<()> {
        self.save(&History::new()).await
    }
}
