//! Text-completion backend abstraction.
//!
//! Every AI-backed agent holds a `TextCompletionBackend` injected at
//! construction, so deployments can swap providers and tests can substitute
//! a deterministic fake.

mod http;

pub use http::{HttpBackendConfig, OpenAiBackend};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("provider returned an empty completion")]
    EmptyCompletion,
}

/// A single non-streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Provider-agnostic text completion: one prompt in, raw text out.
///
/// No retry or backoff happens at this seam; callers time-box the call if
/// they need to and treat a timeout as a normal failure.
#[async_trait]
pub trait TextCompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError>;
}
