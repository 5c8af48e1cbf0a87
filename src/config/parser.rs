use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use catalog_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Delay: {}ms", config.scraper.request_delay_ms);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Stored with each session so runs made under different settings can be
/// told apart.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyChoice;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = create_temp_config(
            r#"
[site]
base-url = "https://shop.example.com"
"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.site.sitemap_path, "/SiteMapDisplayView");
        assert_eq!(config.scraper.request_delay_ms, 1000);
        assert_eq!(config.classifier.strong_tile_threshold, 20);
        assert_eq!(config.classifier.likely_tile_threshold, 10);
        assert_eq!(config.classifier.weak_tile_threshold, 5);
        assert_eq!(config.classifier.tile_set_threshold, 10);
        assert_eq!(config.extraction.strategy, StrategyChoice::Static);
        assert_eq!(config.extraction.max_html_chars, 50_000);
        assert!(config.generator.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let file = create_temp_config(
            r#"
[site]
base-url = "https://shop.example.com"
sitemap-path = "/sitemap"

[scraper]
request-delay-ms = 250
max-categories = 12
sitemap-cache-hours = 6
wait-for-dynamic = false
fetch-timeout-secs = 10

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[classifier]
strong-tile-threshold = 30
likely-tile-threshold = 15
weak-tile-threshold = 6
tile-set-threshold = 8

[extraction]
strategy = "generated"
routine-timeout-ms = 2000

[generator]
endpoint = "https://llm.example.com/v1beta"
model = "test-model"

[output]
database-path = "./test.db"
export-dir = "./exports"
"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.site.sitemap_url(), "https://shop.example.com/sitemap");
        assert_eq!(config.scraper.max_categories, Some(12));
        assert!(!config.scraper.wait_for_dynamic);
        assert_eq!(config.classifier.strong_tile_threshold, 30);
        assert_eq!(config.extraction.strategy, StrategyChoice::Generated);
        let generator = config.generator.unwrap();
        assert_eq!(generator.model, "test-model");
        assert_eq!(generator.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config(
            r#"
[site]
base-url = "https://shop.example.com"

[classifier]
strong-tile-threshold = 5
likely-tile-threshold = 10
"#,
        );
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::Validation(_)
        ));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        assert_ne!(
            compute_config_hash(file1.path()).unwrap(),
            compute_config_hash(file2.path()).unwrap()
        );
    }
}
