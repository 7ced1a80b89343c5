use crate::config::types::{ApiConfig, Config, CrawlConfig, GateConfig, OutputConfig, SessionConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on parallel account walks sharing one credential
pub const MAX_CONCURRENCY: usize = 5;

/// Longest date window a crawl may look back, in days
pub const MAX_DAYS: u32 = 36_500;

/// Longest a credential may be trusted without a new login, in hours
pub const MAX_TTL_HOURS: u64 = 24 * 365;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_session_config(&config.session)?;
    validate_gate_config(&config.gate)?;
    validate_crawl_config(&config.crawl)?;
    validate_api_config(&config.api)?;
    validate_output_config(&config.output)?;
    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.credential_path.is_empty() {
        return Err(ConfigError::Validation(
            "credential_path cannot be empty".to_string(),
        ));
    }

    if config.ttl_hours < 1 || config.ttl_hours > MAX_TTL_HOURS {
        return Err(ConfigError::Validation(format!(
            "ttl_hours must be between 1 and {}, got {}",
            MAX_TTL_HOURS, config.ttl_hours
        )));
    }

    Ok(())
}

fn validate_gate_config(config: &GateConfig) -> Result<(), ConfigError> {
    if config.min_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "min_interval_ms must be >= 100ms, got {}ms",
            config.min_interval_ms
        )));
    }

    if config.max_interval_ms < config.min_interval_ms {
        return Err(ConfigError::Validation(format!(
            "max_interval_ms ({}ms) must not be below min_interval_ms ({}ms)",
            config.max_interval_ms, config.min_interval_ms
        )));
    }

    Ok(())
}

/// Validates crawl configuration
///
/// Also used for per-invocation overrides coming from the command line.
pub fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.days > MAX_DAYS {
        return Err(ConfigError::Validation(format!(
            "days must be at most {} (0 disables the cutoff), got {}",
            MAX_DAYS, config.days
        )));
    }

    validate_concurrency(config.concurrency)?;

    if config.page_size < 1 || config.page_size > 20 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 20, got {}",
            config.page_size
        )));
    }

    if config.content_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "content_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates a batch concurrency value
pub fn validate_concurrency(concurrency: usize) -> Result<(), ConfigError> {
    if concurrency < 1 || concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, concurrency
        )));
    }
    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
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

    Ok(())
}
