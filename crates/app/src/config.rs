//! Settings file and store location.
//!
//! Settings live in `settings.json` under the platform config dir; a missing
//! file means defaults. CLI flags override individual fields afterwards.

use anyhow::{Context, Result};
use shared::settings::AssistantSettings;
use std::fs;
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com.local", "Page Buddy", "PageBuddy")
}

pub fn default_settings_path() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("./settings.json"))
}

/// Load settings from `path` (or the default location); absent file ⇒ defaults
pub fn load_settings(path: Option<&Path>) -> Result<AssistantSettings> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_settings_path);

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(AssistantSettings::default());
    }

    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings = serde_json::from_str(&text)
        .with_context(|| format!("Invalid settings file {}", path.display()))?;
    Ok(settings)
}

/// Where the key-value store file lives for these settings
pub fn store_path(settings: &AssistantSettings) -> PathBuf {
    match &settings.data_dir {
        Some(dir) => PathBuf::from(dir).join("store.json"),
        None => services::JsonFileStore::default_path(),
    }
}
