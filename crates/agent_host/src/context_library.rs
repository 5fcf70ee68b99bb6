//! Uploaded files and free-text context, persisted under `uploadedFiles`.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use services::{KeyValueStore, StoreExt};
use shared::events::keys;
use shared::ContextItem;
use std::path::Path;
use std::sync::Arc;

/// MIME used in data URLs when an upload has no type
const FALLBACK_DATA_MIME: &str = "application/octet-stream";

#[derive(Clone)]
pub struct ContextLibrary {
    store: Arc<dyn KeyValueStore>,
}

impl ContextLibrary {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All items in insertion order, read fresh from the store
    pub async fn list(&self) -> Result<Vec<ContextItem>> {
        let items: Option<Vec<ContextItem>> = self
            .store
            .get_as(keys::UPLOADED_FILES)
            .await
            .context("Failed to load context items")?;
        Ok(items.unwrap_or_default())
    }

    async fn save(&self, items: &[ContextItem]) -> Result<()> {
        self.store
            .set_as(keys::UPLOADED_FILES, items)
            .await
            .context("Failed to save context items")
    }

    async fn push(&self, build: impl FnOnce(String) -> ContextItem) -> Result<ContextItem> {
        let mut items = self.list().await?;
        let item = build(next_id(&items));
        items.push(item.clone());
        self.save(&items).await?;
        tracing::debug!(id = %item.id, name = %item.name, is_file = item.is_file, "added context item");
        Ok(item)
    }

    /// Add an uploaded file. `text/*` uploads are kept as text, anything
    /// else becomes a base64 data URL.
    pub async fn add_file(
        &self,
        name: &str,
        mime_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<ContextItem> {
        let content = encode_upload(mime_type, bytes);
        let size = bytes.len() as u64;
        self.push(|id| ContextItem::file(id, name, mime_type, size, content))
            .await
    }

    /// Read a file from disk and add it; the type is guessed from the extension
    pub async fn add_file_from_path(&self, path: &Path) -> Result<ContextItem> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let mime = mime_guess::from_path(path).first_raw();
        self.add_file(&name, mime, &bytes).await
    }

    /// Add a free-text context snippet (trimmed; blank text is rejected)
    pub async fn add_text(&self, text: &str) -> Result<ContextItem> {
        let text = text.trim();
        if text.is_empty() {
            bail!("Context text is empty");
        }
        let text = text.to_string();
        self.push(|id| ContextItem::text(id, text)).await
    }

    /// Remove the item with `id`; `false` when no such item exists
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut items = self.list().await?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        self.save(&items).await?;
        Ok(true)
    }
}

/// Text for `text/*`, otherwise `data:<mime>;base64,<payload>`
pub fn encode_upload(mime_type: Option<&str>, bytes: &[u8]) -> String {
    match mime_type {
        Some(mime) if mime.starts_with("text/") => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            let mime = mime_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(FALLBACK_DATA_MIME);
            format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
        }
    }
}

/// Millisecond timestamp id, bumped past any id already in use
fn next_id(existing: &[ContextItem]) -> String {
    let mut candidate = chrono::Utc::now().timestamp_millis();
    while existing.iter().any(|item| item.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}
