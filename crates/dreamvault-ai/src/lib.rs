//! Generative model access for dream interpretation, titles, artwork and horoscopes.
//!
//! Handlers talk to a `LanguageModel` trait object; `OpenAiClient` is the
//! production implementation. The functions in `dreams` own the prompts and
//! the parsing/fallback rules so they can be exercised against a stub.

pub mod client;
pub mod dreams;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use client::OpenAiClient;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI provider API key is not configured")]
    NotConfigured,

    #[error("request to AI provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("AI provider returned an empty response")]
    EmptyResponse,

    #[error("invalid response from AI provider: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub quality: String,
    pub style: String,
}

impl ImageRequest {
    /// One square, natural-style image.
    pub fn dream_artwork(prompt: String) -> Self {
        Self {
            model: "dall-e-3".into(),
            prompt,
            n: 1,
            size: "1024x1024".into(),
            quality: "standard".into(),
            style: "natural".into(),
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// False when requests are bound to fail for lack of credentials.
    fn is_configured(&self) -> bool {
        true
    }

    /// Returns the first choice's message text.
    async fn chat(&self, request: ChatRequest) -> Result<String, AiError>;

    /// Returns the first generated image URL, if the provider produced one.
    async fn generate_image(&self, request: ImageRequest) -> Result<Option<String>, AiError>;
}
