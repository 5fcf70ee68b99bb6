//! Headless panel controller.
//!
//! Maps each panel control to an assistant operation and pushes results to a
//! [`PanelView`]. Rendering itself lives with whoever implements the view.

use crate::relay::{take_pending_question, PanelLink};
use crate::{Answer, Assistant};
use anyhow::Result;
use async_trait::async_trait;
use shared::events::{PanelMessage, PanelReply, StoreChange};
use shared::history::History;
use shared::ContextItem;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const LOADING_MESSAGE: &str = "Getting answer...";
pub const ASK_FAILED_MESSAGE: &str =
    "Error: Could not get an answer. Please check your API key and try again.";
pub const KEY_SAVED_STATUS: &str = "✓ API key saved";
pub const KEY_MISSING_STATUS: &str = "✗ Please enter an API key";
pub const HISTORY_CLEARED_STATUS: &str = "✓ Conversation history cleared";

/// How often the watcher looks for a pending record written elsewhere
pub const PENDING_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Display-update callbacks
pub trait PanelView: Send + Sync {
    fn show_context_items(&self, items: &[ContextItem]);
    fn show_history(&self, history: &History);
    fn show_answer(&self, text: &str);
    fn show_status(&self, status: &str);
}

pub struct PanelController {
    assistant: Arc<Assistant>,
    view: Arc<dyn PanelView>,
}

impl PanelController {
    pub fn new(assistant: Arc<Assistant>, view: Arc<dyn PanelView>) -> Self {
        Self { assistant, view }
    }

    pub fn assistant(&self) -> &Arc<Assistant> {
        &self.assistant
    }

    /// Initial render, then pick up any selection queued while closed
    pub async fn open(&self) -> Result<()> {
        self.refresh_context().await?;
        self.refresh_history().await?;
        self.check_pending().await?;
        Ok(())
    }

    pub async fn refresh_context(&self) -> Result<()> {
        let items = self.assistant.context().list().await?;
        self.view.show_context_items(&items);
        Ok(())
    }

    pub async fn refresh_history(&self) -> Result<()> {
        let history = self.assistant.conversation().history().await?;
        self.view.show_history(&history);
        Ok(())
    }

    /// Submit a question. Blank input does nothing.
    pub async fn ask(&self, question: &str) -> Result<Option<Answer>> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }

        self.view.show_answer(LOADING_MESSAGE);
        let answer = match self.assistant.ask(question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "question could not be processed");
                self.view.show_answer(ASK_FAILED_MESSAGE);
                return Ok(None);
            }
        };
        self.view.show_answer(&answer.text);
        self.refresh_history().await?;
        Ok(Some(answer))
    }

    /// Consume a pending question if one is stored. Returns whether one was found.
    pub async fn check_pending(&self) -> Result<bool> {
        let Some(pending) = take_pending_question(self.assistant.store().as_ref()).await? else {
            return Ok(false);
        };
        tracing::info!(queued_at = pending.timestamp, "consuming pending question");
        self.ask(&pending.selected_text).await?;
        Ok(true)
    }

    /// Answer a message from the background side.
    ///
    /// A selection is acknowledged once its question is dispatched; the
    /// answer is produced on a separate task, so failures after this point
    /// are logged and never reach the sender.
    pub async fn handle_message(self: &Arc<Self>, message: PanelMessage) -> Result<PanelReply> {
        match message {
            PanelMessage::ProcessSelectedText { text } => {
                if text.trim().is_empty() {
                    return Ok(PanelReply::default());
                }
                let panel = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = panel.ask(&text).await {
                        tracing::warn!(error = %e, "selected text could not be answered");
                    }
                });
                Ok(PanelReply::ack())
            }
        }
    }

    pub async fn on_store_change(&self, change: &StoreChange) -> Result<()> {
        if change.touches_pending_question() {
            self.check_pending().await?;
        }
        Ok(())
    }

    /// React to store changes until the store goes away.
    ///
    /// Notifications only cover writes made through this process's store, so
    /// the pending record is also checked every [`PENDING_POLL_INTERVAL`] to
    /// pick up selections queued by another process sharing the file.
    pub fn spawn_store_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let panel = Arc::clone(self);
        let mut changes = panel.assistant.store().subscribe();
        tokio::spawn(async move {
            let mut poll = tokio::time::interval(PENDING_POLL_INTERVAL);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    received = changes.recv() => match received {
                        Ok(change) => {
                            if let Err(e) = panel.on_store_change(&change).await {
                                tracing::warn!(error = %e, "store change handling failed");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "store watcher lagged");
                            // Missed notifications may have carried a pending question
                            if let Err(e) = panel.check_pending().await {
                                tracing::warn!(error = %e, "pending check failed");
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = poll.tick() => {
                        if let Err(e) = panel.check_pending().await {
                            tracing::warn!(error = %e, "pending check failed");
                        }
                    }
                }
            }
        })
    }

    pub async fn upload_file(&self, path: &Path) -> Result<ContextItem> {
        let item = self.assistant.context().add_file_from_path(path).await?;
        self.refresh_context().await?;
        Ok(item)
    }

    /// Add free-text context. Blank text is ignored.
    pub async fn add_context(&self, text: &str) -> Result<Option<ContextItem>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let item = self.assistant.context().add_text(text).await?;
        self.refresh_context().await?;
        Ok(Some(item))
    }

    pub async fn delete_context_item(&self, id: &str) -> Result<bool> {
        let removed = self.assistant.context().remove(id).await?;
        self.refresh_context().await?;
        Ok(removed)
    }

    /// Save the key; blank input is refused with a status message
    pub async fn save_api_key(&self, api_key: &str) -> Result<bool> {
        if api_key.trim().is_empty() {
            self.view.show_status(KEY_MISSING_STATUS);
            return Ok(false);
        }
        self.assistant.set_api_key(api_key).await?;
        self.view.show_status(KEY_SAVED_STATUS);
        Ok(true)
    }

    pub async fn load_api_key(&self) -> Result<Option<String>> {
        self.assistant.api_key().await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.assistant.conversation().clear().await?;
        self.view.show_status(HISTORY_CLEARED_STATUS);
        self.refresh_history().await
    }

    pub async fn delete_message(&self, index: usize) -> Result<bool> {
        let removed = self.assistant.conversation().delete_at(index).await?;
        self.refresh_history().await?;
        Ok(removed)
    }
}

/// [`PanelLink`] for a panel living in the same process.
///
/// Messages are only delivered while the panel is marked open; opening runs
/// the panel's initial render, which also consumes any pending question.
pub struct InProcessLink {
    panel: Arc<PanelController>,
    is_open: AtomicBool,
}

impl InProcessLink {
    pub fn new(panel: Arc<PanelController>, is_open: bool) -> Self {
        Self {
            panel,
            is_open: AtomicBool::new(is_open),
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PanelLink for InProcessLink {
    async fn deliver(&self, message: PanelMessage) -> Result<Option<PanelReply>> {
        if !self.is_open() {
            return Ok(None);
        }
        self.panel.handle_message(message).await.map(Some)
    }

    async fn open_panel(&self) -> Result<()> {
        if !self.is_open.swap(true, Ordering::SeqCst) {
            self.panel.open().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{RelayOutcome, SelectionRelay};
    use parking_lot::Mutex;
    use serde_json::json;
    use services::{JsonFileStore, KeyValueStore, MemoryStore, StoreExt};
    use shared::events::keys;
    use shared::settings::AssistantSettings;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingView {
        answers: Mutex<Vec<String>>,
        statuses: Mutex<Vec<String>>,
        history_lens: Mutex<Vec<usize>>,
        item_counts: Mutex<Vec<usize>>,
    }

    impl PanelView for RecordingView {
        fn show_context_items(&self, items: &[ContextItem]) {
            self.item_counts.lock().push(items.len());
        }
        fn show_history(&self, history: &History) {
            self.history_lens.lock().push(history.len());
        }
        fn show_answer(&self, text: &str) {
            self.answers.lock().push(text.to_string());
        }
        fn show_status(&self, status: &str) {
            self.statuses.lock().push(status.to_string());
        }
    }

    async fn mock_answer(text: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": text}]}}]
            })))
            .mount(&server)
            .await;
        server
    }

    async fn panel_for(
        server: &MockServer,
    ) -> (Arc<MemoryStore>, Arc<RecordingView>, Arc<PanelController>) {
        let store = Arc::new(MemoryStore::new());
        store.set_as(keys::API_KEY, "test-key").await.unwrap();
        let settings = AssistantSettings {
            base_url: server.uri(),
            ..AssistantSettings::default()
        };
        let assistant = Arc::new(Assistant::new(store.clone(), &settings).unwrap());
        let view = Arc::new(RecordingView::default());
        let panel = Arc::new(PanelController::new(assistant, view.clone()));
        (store, view, panel)
    }

    #[tokio::test]
    async fn test_ask_shows_loading_then_answer() {
        let server = mock_answer("4").await;
        let (_store, view, panel) = panel_for(&server).await;

        let answer = panel.ask("  What is 2+2? ").await.unwrap().unwrap();
        assert_eq!(answer.text, "4");
        assert_eq!(*view.answers.lock(), vec![LOADING_MESSAGE.to_string(), "4".to_string()]);
        assert_eq!(*view.history_lens.lock(), vec![2]);

        assert!(panel.ask("   ").await.unwrap().is_none());
    }

    async fn wait_for_answer(view: &RecordingView, text: &str) {
        for _ in 0..100 {
            if view.answers.lock().iter().any(|a| a == text) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("answer {:?} never shown", text);
    }

    #[tokio::test]
    async fn test_message_from_background_is_acknowledged() {
        let server = mock_answer("sure").await;
        let (_store, view, panel) = panel_for(&server).await;

        let reply = panel
            .handle_message(PanelMessage::ProcessSelectedText { text: "hi".into() })
            .await
            .unwrap();
        assert!(reply.success);
        wait_for_answer(&view, "sure").await;

        let reply = panel
            .handle_message(PanelMessage::ProcessSelectedText { text: " ".into() })
            .await
            .unwrap();
        assert!(!reply.success);
    }

    #[tokio::test]
    async fn test_pending_question_consumed_once() {
        let server = mock_answer("queued answer").await;
        let (store, view, panel) = panel_for(&server).await;

        let link = Arc::new(InProcessLink::new(panel.clone(), false));
        let relay = SelectionRelay::new(store.clone(), link.clone());
        assert_eq!(relay.relay("selected words").await.unwrap(), RelayOutcome::Queued);
        assert!(link.is_open());

        // Opening consumed the record; later checks find nothing
        assert!(!panel.check_pending().await.unwrap());
        assert!(store.get(keys::SELECTED_TEXT).await.unwrap().is_none());
        assert!(view.answers.lock().contains(&"queued answer".to_string()));

        let history = panel.assistant().conversation().history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].content, "selected words");

        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_link_delivers_directly() {
        let server = mock_answer("direct").await;
        let (store, view, panel) = panel_for(&server).await;

        let link = Arc::new(InProcessLink::new(panel.clone(), true));
        let relay = SelectionRelay::new(store.clone(), link);
        assert_eq!(relay.relay("selection").await.unwrap(), RelayOutcome::Delivered);
        assert!(store.get(keys::PENDING_QUESTION).await.unwrap().is_none());

        wait_for_answer(&view, "direct").await;
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_acknowledgment_does_not_wait_for_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "candidates": [{"content": {"parts": [{"text": "slow"}]}}]
                    }))
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;
        let (store, view, panel) = panel_for(&server).await;

        let link = Arc::new(InProcessLink::new(panel.clone(), true));
        let relay = SelectionRelay::new(store.clone(), link);
        let outcome = tokio::time::timeout(Duration::from_millis(500), relay.relay("take your time"))
            .await
            .expect("relay waited for the answer")
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Delivered);
        assert!(store.get(keys::PENDING_QUESTION).await.unwrap().is_none());

        wait_for_answer(&view, "slow").await;
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_change_triggers_pending_check() {
        let server = mock_answer("from change").await;
        let (store, view, panel) = panel_for(&server).await;

        store
            .set_many(vec![
                (keys::SELECTED_TEXT.into(), json!("via storage")),
                (keys::PENDING_QUESTION.into(), json!(true)),
                (keys::TIMESTAMP.into(), json!(1)),
            ])
            .await
            .unwrap();
        panel
            .on_store_change(&StoreChange::new([keys::SELECTED_TEXT]))
            .await
            .unwrap();
        assert!(view.answers.lock().contains(&"from change".to_string()));

        // Unrelated changes do nothing
        panel
            .on_store_change(&StoreChange::new([keys::UPLOADED_FILES]))
            .await
            .unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_controls_update_view() {
        let server = mock_answer("ok").await;
        let (_store, view, panel) = panel_for(&server).await;

        assert!(!panel.save_api_key("  ").await.unwrap());
        assert!(panel.save_api_key("new-key").await.unwrap());
        assert_eq!(panel.load_api_key().await.unwrap().as_deref(), Some("new-key"));

        assert!(panel.add_context("").await.unwrap().is_none());
        let item = panel.add_context("extra").await.unwrap().unwrap();
        assert!(panel.delete_context_item(&item.id).await.unwrap());
        assert_eq!(*view.item_counts.lock(), vec![1, 0]);

        panel.ask("q").await.unwrap();
        assert!(panel.delete_message(1).await.unwrap());
        assert!(!panel.delete_message(5).await.unwrap());
        panel.clear_history().await.unwrap();

        assert_eq!(
            *view.statuses.lock(),
            vec![
                KEY_MISSING_STATUS.to_string(),
                KEY_SAVED_STATUS.to_string(),
                HISTORY_CLEARED_STATUS.to_string()
            ]
        );
        assert_eq!(view.history_lens.lock().last(), Some(&0));
    }

    #[tokio::test]
    async fn test_watcher_picks_up_selection_queued_by_another_store() {
        let server = mock_answer("seen").await;
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("store.json");

        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&path).await.unwrap());
        store.set_as(keys::API_KEY, "test-key").await.unwrap();
        let settings = AssistantSettings {
            base_url: server.uri(),
            ..AssistantSettings::default()
        };
        let assistant = Arc::new(Assistant::new(store.clone(), &settings).unwrap());
        let view = Arc::new(RecordingView::default());
        let panel = Arc::new(PanelController::new(assistant, view.clone()));
        let watcher = panel.spawn_store_watcher();

        // Written through a second handle, so this panel gets no notification
        let other = JsonFileStore::open(&path).await.unwrap();
        SelectionRelay::new(Arc::new(other), Arc::new(NoPanelLink))
            .relay("from the other side")
            .await
            .unwrap();

        wait_for_answer(&view, "seen").await;
        watcher.abort();
        assert!(store.get(keys::PENDING_QUESTION).await.unwrap().is_none());
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    /// A link with no panel behind it
    struct NoPanelLink;

    #[async_trait]
    impl PanelLink for NoPanelLink {
        async fn deliver(&self, _message: PanelMessage) -> Result<Option<PanelReply>> {
            Ok(None)
        }

        async fn open_panel(&self) -> Result<()> {
            Ok(())
        }
    }
}
