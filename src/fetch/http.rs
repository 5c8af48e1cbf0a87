//! HTTP fetcher implementation
//!
//! This module handles all page requests for the harvester, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with status and Content-Type checks
//! - Re-fetching pages that arrive as an unrendered script shell
//! - Error classification

use crate::config::UserAgentConfig;
use crate::fetch::{FetchOptions, FetchOutcome, PageFetcher};
use crate::html::visible_text_chars;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Pages with less visible text than this are treated as a script shell
pub const SCRIPT_SHELL_TEXT_CHARS: usize = 200;

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::UserAgentConfig;
/// use catalog_harvest::fetch::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "CatalogHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`PageFetcher`]
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }

    async fn fetch_once(&self, url: &str) -> FetchOutcome {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::failed(classify_error(&e)),
        };

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return FetchOutcome::failed("Not found (HTTP 404)").with_status(status.as_u16());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return FetchOutcome::failed("Rate limited (HTTP 429)").with_status(status.as_u16());
        }

        if !status.is_success() {
            return FetchOutcome::failed(format!("HTTP {}", status.as_u16()))
                .with_status(status.as_u16());
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.is_empty() && !content_type.contains("html") {
            return FetchOutcome::failed(format!("Not an HTML page: {}", content_type))
                .with_status(status.as_u16());
        }

        match response.text().await {
            Ok(body) => FetchOutcome::ok(body).with_status(status.as_u16()),
            Err(e) => FetchOutcome::failed(format!("Failed to read body: {}", e))
                .with_status(status.as_u16()),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome {
        let mut outcome = self.fetch_once(url).await;

        if !options.wait_for_dynamic {
            return outcome;
        }

        let mut attempt = 1;
        while attempt < options.max_attempts {
            let shell = match &outcome.content {
                Some(body) if outcome.success => {
                    visible_text_chars(body) < SCRIPT_SHELL_TEXT_CHARS
                }
                _ => false,
            };
            if !shell {
                break;
            }

            debug!(url, attempt, "Page looks like a script shell, waiting to re-fetch");
            tokio::time::sleep(options.settle_delay).await;
            attempt += 1;

            let retry = self.fetch_once(url).await;
            if retry.success {
                outcome = retry;
            } else {
                warn!(url, error = ?retry.error, "Re-fetch failed, keeping first response");
                break;
            }
        }

        outcome
    }
}

fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else if e.is_redirect() {
        "Too many redirects".to_string()
    } else {
        e.to_string()
    }
}
