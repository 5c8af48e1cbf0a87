//! Catalog-Harvest: a category/product harvester for retail catalog sites
//!
//! This crate walks a retail site's category hierarchy, decides for every
//! category page whether it is a navigation page or a product listing, extracts
//! products from listings (with static selectors or a generated, sandboxed
//! extraction routine) and persists everything to SQLite.

pub mod backend;
pub mod classifier;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod harvest;
pub mod html;
pub mod model;
pub mod output;
pub mod query;
pub mod sitemap;
pub mod storage;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Category discovery failed: {0}")]
    Discovery(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Generative backend error: {0}")]
    Backend(#[from] backend::BackendError),

    #[error("Query error: {0}")]
    Query(#[from] query::QueryError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("URL points off-site: {0}")]
    OffSite(String),

    #[error("Link is not navigable: {0}")]
    NotNavigable(String),
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use classifier::{classify_heuristic, Classifier, ClassifierPolicy};
pub use config::Config;
pub use extract::{ExtractionEngine, ExtractionOutput, ExtractionStrategy};
pub use harvest::{HarvestEvent, Orchestrator, RunSummary};
pub use model::{
    CategoryNode, CategoryType, ClassificationResult, ConfidenceSource, ExtractedEntity,
    SessionStatus,
};
