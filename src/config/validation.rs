use crate::config::types::{
    ClassifierConfig, Config, ExtractionConfig, GeneratorConfig, OutputConfig, ScraperConfig,
    SiteConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_scraper_config(&config.scraper)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_classifier_config(&config.classifier)?;
    validate_extraction_config(&config.extraction)?;
    if let Some(generator) = &config.generator {
        validate_generator_config(generator)?;
    }
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the target site section
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' has no host",
            config.base_url
        )));
    }

    if config.sitemap_path.is_empty() {
        return Err(ConfigError::Validation(
            "sitemap-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.max_categories == Some(0) {
        return Err(ConfigError::Validation(
            "max-categories must be >= 1 when set".to_string(),
        ));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch-timeout-secs must be >= 1, got {}",
            config.fetch_timeout_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Thresholds must be strictly ordered, otherwise the tile bands overlap
fn validate_classifier_config(config: &ClassifierConfig) -> Result<(), ConfigError> {
    if config.weak_tile_threshold == 0 {
        return Err(ConfigError::Validation(
            "weak-tile-threshold must be >= 1".to_string(),
        ));
    }

    if config.likely_tile_threshold <= config.weak_tile_threshold {
        return Err(ConfigError::Validation(format!(
            "likely-tile-threshold ({}) must be greater than weak-tile-threshold ({})",
            config.likely_tile_threshold, config.weak_tile_threshold
        )));
    }

    if config.strong_tile_threshold <= config.likely_tile_threshold {
        return Err(ConfigError::Validation(format!(
            "strong-tile-threshold ({}) must be greater than likely-tile-threshold ({})",
            config.strong_tile_threshold, config.likely_tile_threshold
        )));
    }

    if config.tile_set_threshold == 0 {
        return Err(ConfigError::Validation(
            "tile-set-threshold must be >= 1".to_string(),
        ));
    }

    if config.ai_sample_chars == 0 {
        return Err(ConfigError::Validation(
            "ai-sample-chars must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.max_html_chars == 0 {
        return Err(ConfigError::Validation(
            "max-html-chars must be >= 1".to_string(),
        ));
    }

    if !(100..=60_000).contains(&config.routine_timeout_ms) {
        return Err(ConfigError::Validation(format!(
            "routine-timeout-ms must be between 100 and 60000, got {}",
            config.routine_timeout_ms
        )));
    }

    if config.max_routine_entities == 0 {
        return Err(ConfigError::Validation(
            "max-routine-entities must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_generator_config(config: &GeneratorConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid generator endpoint: {}", e)))?;

    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "generator model cannot be empty".to_string(),
        ));
    }

    if config.api_key_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "api-key-env cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.export_dir.is_empty() {
        return Err(ConfigError::Validation(
            "export-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
