//! Selection relay: hands text selected on a page to the panel.
//!
//! Direct delivery is tried first. When no panel acknowledges, the text is
//! parked in the store as a pending question and the panel is asked to
//! open; the panel consumes the record on open or on the store change.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use services::{KeyValueStore, StoreExt};
use shared::events::{keys, PanelMessage, PanelReply, PendingQuestion};
use std::sync::Arc;

/// Host-side connection to the panel
#[async_trait]
pub trait PanelLink: Send + Sync {
    /// Deliver a message to an open panel. `Ok(None)` when no panel is listening.
    async fn deliver(&self, message: PanelMessage) -> Result<Option<PanelReply>>;

    /// Ask the host to show the panel
    async fn open_panel(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// An open panel acknowledged the selection
    Delivered,
    /// Stored as a pending question for the panel to pick up
    Queued,
    /// Nothing was selected
    Ignored,
}

pub struct SelectionRelay {
    store: Arc<dyn KeyValueStore>,
    link: Arc<dyn PanelLink>,
}

impl SelectionRelay {
    pub fn new(store: Arc<dyn KeyValueStore>, link: Arc<dyn PanelLink>) -> Self {
        Self { store, link }
    }

    /// Handle one "ask about selection" gesture
    pub async fn relay(&self, selection: &str) -> Result<RelayOutcome> {
        if selection.trim().is_empty() {
            return Ok(RelayOutcome::Ignored);
        }

        let message = PanelMessage::ProcessSelectedText {
            text: selection.to_string(),
        };
        let acknowledged = match self.link.deliver(message).await {
            Ok(reply) => reply.map(|r| r.success).unwrap_or(false),
            Err(e) => {
                tracing::debug!(error = %e, "direct delivery failed");
                false
            }
        };
        tracing::debug!(acknowledged, "panel delivery attempted");
        if acknowledged {
            return Ok(RelayOutcome::Delivered);
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        self.store
            .set_many(vec![
                (keys::SELECTED_TEXT.to_string(), Value::from(selection)),
                (keys::PENDING_QUESTION.to_string(), Value::Bool(true)),
                (keys::TIMESTAMP.to_string(), Value::from(timestamp)),
            ])
            .await
            .context("Failed to store pending question")?;
        tracing::info!("selection queued as pending question");

        self.link.open_panel().await?;
        Ok(RelayOutcome::Queued)
    }
}

/// Read and remove the pending-question record.
///
/// The record is deleted before it is returned, so a second call (or the
/// store change caused by the deletion) finds nothing.
pub async fn take_pending_question(store: &dyn KeyValueStore) -> Result<Option<PendingQuestion>> {
    let pending: Option<bool> = store
        .get_as(keys::PENDING_QUESTION)
        .await
        .context("Failed to read pending flag")?;
    if pending != Some(true) {
        return Ok(None);
    }

    let text: Option<String> = store
        .get_as(keys::SELECTED_TEXT)
        .await
        .context("Failed to read selected text")?;
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return Ok(None);
    };
    let timestamp: Option<i64> = store.get_as(keys::TIMESTAMP).await.unwrap_or(None);

    store
        .remove(&keys::PENDING_RECORD)
        .await
        .context("Failed to clear pending question")?;

    Ok(Some(PendingQuestion {
        selected_text: text,
        timestamp: timestamp.unwrap_or_default(),
    }))
}
