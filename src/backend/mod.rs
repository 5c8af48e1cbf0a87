//! Generative backend seam
//!
//! The backend is unreliable by contract: every caller must tolerate errors,
//! empty text and malformed output. Nothing it returns is trusted before it
//! passes the parsing helpers in [`parse`].

mod http;
pub mod parse;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpGenerativeBackend;

/// Errors raised while talking to a generative backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend returned no text")]
    EmptyResponse,

    #[error("Malformed backend output: {0}")]
    Malformed(String),

    #[error("API key variable {0} is not set")]
    MissingApiKey(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// A text-in/text-out generative model
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Sends one prompt and returns the raw completion text
    async fn generate(&self, prompt: &str) -> BackendResult<String>;

    /// Short identifier used in logs
    fn name(&self) -> &str {
        "generative-backend"
    }
}
