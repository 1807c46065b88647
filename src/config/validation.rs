use crate::config::types::{Config, CrawlConfig, HttpConfig, OutputConfig, TargetConfig};
use crate::url::apply_page;
use crate::ConfigError;
use reqwest::header::HeaderValue;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_target_config(&config.target)?;
    validate_http_config(&config.http)?;
    validate_crawl_config(&config.crawl)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the crawl target
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    if config.base_url.trim().is_empty() {
        return Err(ConfigError::Validation("base_url cannot be empty".to_string()));
    }

    // The first page URL must be a valid http(s) URL once the page is filled in
    apply_page(&config.base_url, 1)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if config.element_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "element_id cannot be empty".to_string(),
        ));
    }

    if config.json_path.is_empty() {
        return Err(ConfigError::Validation(
            "json_path must contain at least one key".to_string(),
        ));
    }

    if config.json_path.iter().any(|segment| segment.is_empty()) {
        return Err(ConfigError::Validation(format!(
            "json_path cannot contain empty keys, got {:?}",
            config.json_path
        )));
    }

    Ok(())
}

/// Validates HTTP client settings
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    for (field, value) in [
        ("user_agent", &config.user_agent),
        ("accept", &config.accept),
        ("accept_language", &config.accept_language),
    ] {
        if HeaderValue::from_str(value).is_err() {
            return Err(ConfigError::Validation(format!(
                "{} is not a valid header value: {:?}",
                field, value
            )));
        }
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "connect_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry and circuit breaker limits
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.max_consecutive_failures < 1 {
        return Err(ConfigError::Validation(format!(
            "max_consecutive_failures must be >= 1, got {}",
            config.max_consecutive_failures
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.dataset_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "dataset_path cannot be empty".to_string(),
        ));
    }

    if config
        .checkpoint_path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty when set".to_string(),
        ));
    }

    if config.separator.is_empty() {
        return Err(ConfigError::Validation(
            "separator cannot be empty".to_string(),
        ));
    }

    Ok(())
}
