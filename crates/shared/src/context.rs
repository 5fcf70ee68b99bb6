//! Context items: uploaded files and free-text snippets attached to questions.
//!
//! Items are stored under the `uploadedFiles` key with camelCase field names,
//! so a record written by the panel looks like:
//! `{"id":"1700000000000","name":"notes.txt","type":"text/plain","size":5,...,"isFile":true}`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name used for free-text context entries
pub const EXTRA_CONTEXT_NAME: &str = "Extra Context";

/// Type reported when an upload has no recognizable MIME type
pub const UNKNOWN_TYPE: &str = "Unknown";

/// A unit of supplementary material sent alongside a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    /// Time-derived unique id (milliseconds since epoch)
    pub id: String,
    pub name: String,
    /// Text payload; binary uploads carry a `data:` URL
    pub content: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Byte count of the original upload (files only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub date: DateTime<Utc>,
    pub is_file: bool,
}

impl ContextItem {
    /// Create a file-backed item
    pub fn file(
        id: impl Into<String>,
        name: impl Into<String>,
        mime_type: Option<&str>,
        size: u64,
        content: impl Into<String>,
    ) -> Self {
        let mime_type = match mime_type {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => UNKNOWN_TYPE.to_string(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
            mime_type,
            size: Some(size),
            date: Utc::now(),
            is_file: true,
        }
    }

    /// Create a free-text context item
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: EXTRA_CONTEXT_NAME.to_string(),
            content: content.into(),
            mime_type: "text/plain".to_string(),
            size: None,
            date: Utc::now(),
            is_file: false,
        }
    }

    /// The block this item contributes to a context preamble
    pub fn preamble_block(&self) -> String {
        if self.is_file {
            format!("File: {}\n{}\n\n", self.name, self.content)
        } else {
            format!("Extra Context:\n{}\n\n", self.content)
        }
    }

    /// Size line for list display, e.g. "1.5 KB"
    pub fn formatted_size(&self) -> Option<String> {
        self.size.map(format_size)
    }

    /// Local creation time for list display
    pub fn formatted_date(&self) -> String {
        self.date
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Format a byte count the way the panel lists uploads ("0 Bytes", "2.5 MB")
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
