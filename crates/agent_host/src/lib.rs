//! Assistant core: history, context, generation, and the headless panel.

pub mod context_library;
pub mod conversation;
pub mod panel;
pub mod relay;

pub use context_library::ContextLibrary;
pub use conversation::ConversationAssembler;
pub use panel::{PanelController, PanelView};
pub use relay::{PanelLink, RelayOutcome, SelectionRelay};

use anyhow::{Context, Result};
use providers::gemini::{GeminiClient, GenerateRequest};
use services::{KeyValueStore, StoreExt};
use shared::error::GenerationError;
use shared::events::keys;
use shared::settings::AssistantSettings;
use std::sync::Arc;

/// Result of one question attempt.
///
/// `text` is always displayable: the model's answer, or the message for
/// whichever failure ended the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub error: Option<GenerationError>,
}

impl Answer {
    fn answered(text: String) -> Self {
        Self { text, error: None }
    }

    fn failed(error: GenerationError) -> Self {
        Self {
            text: error.to_string(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Ties the store, the conversation, the context library and the client together
pub struct Assistant {
    store: Arc<dyn KeyValueStore>,
    conversation: ConversationAssembler,
    context: ContextLibrary,
    client: GeminiClient,
}

impl Assistant {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: &AssistantSettings) -> Result<Self> {
        let client = GeminiClient::new(settings).context("Failed to build HTTP client")?;
        Ok(Self {
            conversation: ConversationAssembler::new(store.clone()),
            context: ContextLibrary::new(store.clone()),
            store,
            client,
        })
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn conversation(&self) -> &ConversationAssembler {
        &self.conversation
    }

    pub fn context(&self) -> &ContextLibrary {
        &self.context
    }

    /// Saved API key, if any (blank counts as unset)
    pub async fn api_key(&self) -> Result<Option<String>> {
        let key: Option<String> = self
            .store
            .get_as(keys::API_KEY)
            .await
            .context("Failed to load API key")?;
        Ok(key.filter(|k| !k.trim().is_empty()))
    }

    pub async fn set_api_key(&self, api_key: &str) -> Result<()> {
        self.store
            .set_as(keys::API_KEY, api_key.trim())
            .await
            .context("Failed to save API key")
    }

    /// Transmit an assembled request with the saved key.
    ///
    /// Without a key this returns `MissingCredential` and makes no call. A
    /// store that cannot be read is a `TransportFailure`, also without a call.
    pub async fn send(&self, request: &GenerateRequest) -> Result<String, GenerationError> {
        let api_key = match self.api_key().await {
            Ok(Some(key)) => key,
            Ok(None) => return Err(GenerationError::MissingCredential),
            Err(e) => {
                tracing::warn!(error = %e, "could not read API key");
                return Err(GenerationError::TransportFailure(format!("{:#}", e)));
            }
        };
        self.client.generate(&api_key, request).await
    }

    /// Ask a question with the stored context items and history.
    ///
    /// The question is recorded before the call; the answer only on success.
    /// A missing key ends the attempt before anything is recorded.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        if self.api_key().await?.is_none() {
            tracing::info!("no API key configured");
            return Ok(Answer::failed(GenerationError::MissingCredential));
        }

        let items = self.context.list().await?;
        let request = self.conversation.build_request(question, &items).await?;

        match self.send(&request).await {
            Ok(text) => {
                self.conversation.record_answer(&text).await?;
                tracing::info!(chars = text.len(), "answer received");
                Ok(Answer::answered(text))
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "question attempt failed");
                Ok(Answer::failed(e))
            }
        }
    }
}
