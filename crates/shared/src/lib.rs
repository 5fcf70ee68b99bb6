pub mod context;
pub mod error;
pub mod events;
pub mod history;

pub use context::ContextItem;
pub use error::GenerationError;
pub use history::{History, HistoryMessage, Role};

pub mod settings {
    use serde::{Deserialize, Serialize};

    fn default_timeout_secs() -> u64 {
        60
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AssistantSettings {
        pub model: String,    // e.g., "gemini-2.0-flash"
        pub base_url: String, // API root; the model path is appended
        #[serde(default = "default_timeout_secs")]
        pub request_timeout_secs: u64,
        /// Where the store file lives; platform data dir when unset
        #[serde(default)]
        pub data_dir: Option<String>,
    }

    impl AssistantSettings {
        /// Full `generateContent` URL for the configured model
        pub fn endpoint_url(&self) -> String {
            format!(
                "{}/models/{}:generateContent",
                self.base_url.trim_end_matches('/'),
                self.model
            )
        }
    }

    impl Default for AssistantSettings {
        fn default() -> Self {
            Self {
                model: "gemini-2.0-flash".into(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
                request_timeout_secs: default_timeout_secs(),
                data_dir: None,
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_default_endpoint() {
            assert_eq!(
                AssistantSettings::default().endpoint_url(),
                "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
            );
        }

        #[test]
        fn test_partial_settings_file() {
            let settings: AssistantSettings = serde_json::from_str(
                r#"{"model": "gemini-1.5-flash", "base_url": "http://localhost:9000/"}"#,
            )
            .unwrap();
            assert_eq!(settings.request_timeout_secs, 60);
            assert_eq!(
                settings.endpoint_url(),
                "http://localhost:9000/models/gemini-1.5-flash:generateContent"
            );
        }
    }
}
