use serde::Deserialize;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub generator: Option<GeneratorConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Origin every relative link is resolved against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path (or absolute URL) of the sitemap page listing the categories
    #[serde(rename = "sitemap-path", default = "default_sitemap_path")]
    pub sitemap_path: String,
}

impl SiteConfig {
    /// Absolute URL of the sitemap page
    pub fn sitemap_url(&self) -> String {
        if self.sitemap_path.starts_with("http://") || self.sitemap_path.starts_with("https://") {
            self.sitemap_path.clone()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                self.sitemap_path.trim_start_matches('/')
            )
        }
    }
}

/// Traversal behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Delay between consecutive page requests (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Cap on the number of category nodes visited per session
    #[serde(rename = "max-categories", default)]
    pub max_categories: Option<usize>,

    /// How long a discovered category tree may be reused (hours)
    #[serde(rename = "sitemap-cache-hours", default = "default_sitemap_cache_hours")]
    pub sitemap_cache_hours: u32,

    /// Re-fetch pages that look like an unrendered script shell
    #[serde(rename = "wait-for-dynamic", default = "default_true")]
    pub wait_for_dynamic: bool,

    /// Per-request timeout (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: default_request_delay_ms(),
            max_categories: None,
            sitemap_cache_hours: default_sitemap_cache_hours(),
            wait_for_dynamic: true,
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    #[serde(rename = "contact-url")]
    pub contact_url: String,

    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "catalog-harvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "ops@example.com".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Tile-count thresholds used by the leaf/non-leaf heuristic
///
/// The defaults were calibrated against one catalog site's markup; another
/// site needs its own calibration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(rename = "strong-tile-threshold", default = "default_strong_tiles")]
    pub strong_tile_threshold: usize,

    #[serde(rename = "likely-tile-threshold", default = "default_likely_tiles")]
    pub likely_tile_threshold: usize,

    #[serde(rename = "weak-tile-threshold", default = "default_weak_tiles")]
    pub weak_tile_threshold: usize,

    #[serde(rename = "tile-set-threshold", default = "default_tile_sets")]
    pub tile_set_threshold: usize,

    /// Maximum characters of denoised HTML sent to the backend for the override
    #[serde(rename = "ai-sample-chars", default = "default_ai_sample_chars")]
    pub ai_sample_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strong_tile_threshold: default_strong_tiles(),
            likely_tile_threshold: default_likely_tiles(),
            weak_tile_threshold: default_weak_tiles(),
            tile_set_threshold: default_tile_sets(),
            ai_sample_chars: default_ai_sample_chars(),
        }
    }
}

/// Which extraction strategy leads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyChoice {
    Static,
    Generated,
}

/// Extraction engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_strategy")]
    pub strategy: StrategyChoice,

    /// Upper bound on denoised HTML handed to the backend
    #[serde(rename = "max-html-chars", default = "default_max_html_chars")]
    pub max_html_chars: usize,

    /// Wall-clock budget for one generated routine execution (milliseconds)
    #[serde(rename = "routine-timeout-ms", default = "default_routine_timeout_ms")]
    pub routine_timeout_ms: u64,

    /// Upper bound on entities a generated routine may emit per entity type
    #[serde(rename = "max-routine-entities", default = "default_max_routine_entities")]
    pub max_routine_entities: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_html_chars: default_max_html_chars(),
            routine_timeout_ms: default_routine_timeout_ms(),
            max_routine_entities: default_max_routine_entities(),
        }
    }
}

/// Generative backend configuration; absent means no backend
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(rename = "api-key-env", default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(rename = "request-timeout-secs", default = "default_generator_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    #[serde(rename = "export-dir", default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            export_dir: default_export_dir(),
        }
    }
}

fn default_sitemap_path() -> String {
    "/SiteMapDisplayView".to_string()
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_sitemap_cache_hours() -> u32 {
    24
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_strong_tiles() -> usize {
    crate::classifier::STRONG_TILE_THRESHOLD
}

fn default_likely_tiles() -> usize {
    crate::classifier::LIKELY_TILE_THRESHOLD
}

fn default_weak_tiles() -> usize {
    crate::classifier::WEAK_TILE_THRESHOLD
}

fn default_tile_sets() -> usize {
    crate::classifier::TILE_SET_THRESHOLD
}

fn default_ai_sample_chars() -> usize {
    10_000
}

fn default_strategy() -> StrategyChoice {
    StrategyChoice::Static
}

fn default_max_html_chars() -> usize {
    50_000
}

fn default_routine_timeout_ms() -> u64 {
    5_000
}

fn default_max_routine_entities() -> usize {
    500
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_generator_timeout_secs() -> u64 {
    60
}

fn default_database_path() -> String {
    "db/catalog.db".to_string()
}

fn default_export_dir() -> String {
    "db/exports".to_string()
}
