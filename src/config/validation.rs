use crate::config::types::{Config, CrawlerConfig, FetcherConfig, ModesConfig, OutputConfig};
use crate::storage::SeedUrl;
use crate::url::validate_audio_url;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_output_config(&config.output)?;
    validate_modes_config(&config.modes)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_urls < 1 || config.max_concurrent_urls > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_urls must be between 1 and 64, got {}",
            config.max_concurrent_urls
        )));
    }

    if config.max_concurrent_pages < 1 || config.max_concurrent_pages > config.max_concurrent_urls
    {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_pages must be between 1 and max_concurrent_urls ({}), got {}",
            config.max_concurrent_urls, config.max_concurrent_pages
        )));
    }

    if config.timeout < 100 {
        return Err(ConfigError::Validation(format!(
            "timeout must be >= 100ms, got {}ms",
            config.timeout
        )));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.max_retry_backoff < config.retry_backoff {
        return Err(ConfigError::Validation(format!(
            "max_retry_backoff ({}ms) must be >= retry_backoff ({}ms)",
            config.max_retry_backoff, config.retry_backoff
        )));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid fetcher endpoint: {}", e)))?;

    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "Fetcher endpoint '{}' must use http or https",
            config.endpoint
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if let Some(test_path) = &config.test_database_path {
        if test_path.is_empty() {
            return Err(ConfigError::Validation(
                "test_database_path cannot be empty when set".to_string(),
            ));
        }
        if test_path == &config.database_path {
            return Err(ConfigError::Validation(
                "test_database_path must differ from database_path".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_modes_config(config: &ModesConfig) -> Result<(), ConfigError> {
    if config.test_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "test_limit must be >= 1, got {}",
            config.test_limit
        )));
    }

    if config.update_limit == Some(0) {
        return Err(ConfigError::Validation(
            "update_limit must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_seeds(seeds: &[SeedUrl]) -> Result<(), ConfigError> {
    for seed in seeds {
        let check = validate_audio_url(Some(&seed.url));
        if let Some(error) = check.error {
            return Err(ConfigError::InvalidUrl(format!(
                "Invalid seed URL '{}': {}",
                seed.url, error
            )));
        }
    }
    Ok(())
}
