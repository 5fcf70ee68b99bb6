use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::error::GenerationError;
use shared::history::Role;
use shared::settings::AssistantSettings;
use std::time::Duration;

/// Header carrying the API key; the key never goes into the URL or body
pub const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    /// A single-part text turn for the given speaker
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            // Gemini speaker roles are exactly "user" | "model"
            role: Some(role.as_str().to_string()),
            parts: vec![GeminiPart { text: text.into() }],
        }
    }

    /// Concatenated text of all parts
    pub fn joined_text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeminiPart {
    pub text: String,
}

/// Body of a `generateContent` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub contents: Vec<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

impl GeminiResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
    }
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: Option<GeminiErrorDetail>,
}

pub struct GeminiClient {
    http: Client,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(settings: &AssistantSettings) -> Result<Self> {
        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(settings.request_timeout_secs))
                .build()?,
            endpoint: settings.endpoint_url(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one `generateContent` request and extract the first candidate's text.
    ///
    /// No retries: every failure is reported once and ends the attempt.
    pub async fn generate(
        &self,
        api_key: &str,
        request: &GenerateRequest,
    ) -> std::result::Result<String, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingCredential);
        }
        if request.contents.is_empty() {
            return Err(GenerationError::TransportFailure(
                "Request has no contents".to_string(),
            ));
        }

        tracing::debug!(turns = request.contents.len(), "sending generateContent");
        let resp = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::TransportFailure(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message);
            tracing::warn!(status = status.as_u16(), ?message, "gemini error");
            return Err(GenerationError::EndpointError {
                status: status.as_u16(),
                message,
            });
        }

        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::TransportFailure(e.to_string()))?;
        body.first_text().ok_or(GenerationError::EmptyResponse)
    }
}
