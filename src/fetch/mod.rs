//! Page fetching
//!
//! The orchestrator only sees the [`PageFetcher`] trait. The HTTP
//! implementation lives in [`http`]; tests script their own fetchers.

mod http;

use async_trait::async_trait;
use std::time::Duration;

pub use http::{build_http_client, HttpFetcher, SCRIPT_SHELL_TEXT_CHARS};

/// Per-request fetch options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Re-fetch pages that arrive as an unrendered script shell
    pub wait_for_dynamic: bool,

    /// Pause before each re-fetch of a script shell
    pub settle_delay: Duration,

    /// Total attempts when waiting for dynamic content, including the first
    pub max_attempts: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            wait_for_dynamic: false,
            settle_delay: Duration::from_secs(2),
            max_attempts: 3,
        }
    }
}

impl FetchOptions {
    pub fn waiting_for_dynamic() -> Self {
        Self {
            wait_for_dynamic: true,
            ..Self::default()
        }
    }
}

/// Outcome of one fetch: `content` on success, `error` otherwise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub success: bool,
    pub content: Option<String>,
    pub error: Option<String>,
    pub status_code: Option<u16>,
}

impl FetchOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: Some(content.into()),
            error: None,
            status_code: Some(200),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: None,
            error: Some(error.into()),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Body of a successful fetch, or the error message
    pub fn into_result(self) -> Result<String, String> {
        match (self.success, self.content) {
            (true, Some(content)) => Ok(content),
            _ => Err(self
                .error
                .unwrap_or_else(|| "fetch returned no content".to_string())),
        }
    }
}

/// Fetches pages by absolute URL
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Never returns an error: failures are reported inside the outcome
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome;
}
