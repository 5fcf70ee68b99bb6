//! Failure kinds for a single question attempt.
//!
//! Every variant renders to the text shown to the user, so callers that only
//! need something to display can use `to_string()`.

/// Shown when no API key has been saved
pub const MISSING_KEY_MESSAGE: &str = "Please set your Gemini API key in the settings.";

/// Shown when the endpoint answered without a usable candidate
pub const EMPTY_RESPONSE_MESSAGE: &str = "Sorry, I couldn't generate an answer.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Please set your Gemini API key in the settings.")]
    MissingCredential,

    #[error("Error from Gemini API: {}", .message.as_deref().unwrap_or("Unknown error"))]
    EndpointError {
        status: u16,
        message: Option<String>,
    },

    #[error("Sorry, I couldn't generate an answer.")]
    EmptyResponse,

    #[error("Error: {0}")]
    TransportFailure(String),
}

impl GenerationError {
    /// Short machine-friendly name, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::MissingCredential => "missing_credential",
            GenerationError::EndpointError { .. } => "endpoint_error",
            GenerationError::EmptyResponse => "empty_response",
            GenerationError::TransportFailure(_) => "transport_failure",
        }
    }
}
