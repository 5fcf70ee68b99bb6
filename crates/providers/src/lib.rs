pub mod gemini;

pub use gemini::{GeminiClient, GeminiContent, GeminiPart, GenerateRequest};
