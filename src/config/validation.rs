use crate::config::types::{Config, HarvestConfig, OutputConfig, SlackConfig, TOKEN_ENV_VAR};
use crate::ConfigError;
use url::Url;

const MAX_CONCURRENCY: usize = 64;
const MAX_PAGE_LIMIT: u32 = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_slack_config(&config.slack)?;
    validate_harvest_config(&config.harvest)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates credentials and channel selection
fn validate_slack_config(config: &SlackConfig) -> Result<(), ConfigError> {
    if config.resolved_token().is_none() {
        return Err(ConfigError::Validation(format!(
            "token must be set in [slack] or via the {} environment variable",
            TOKEN_ENV_VAR
        )));
    }

    validate_channel_id(&config.channel_id)?;

    let url = Url::parse(&config.api_base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid api-base-url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "api-base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(())
}

/// Channel ids are upper-case alphanumerics such as `C0123ABC`
fn validate_channel_id(channel_id: &str) -> Result<(), ConfigError> {
    if channel_id.is_empty() {
        return Err(ConfigError::Validation(
            "channel-id cannot be empty".to_string(),
        ));
    }

    if !channel_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(format!(
            "channel-id must be alphanumeric, got '{}'",
            channel_id
        )));
    }

    Ok(())
}

/// Validates harvest limits
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.reply_concurrency < 1 || config.reply_concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "reply-concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.reply_concurrency
        )));
    }

    if config.permalink_concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "permalink-concurrency must be between 0 and {}, got {}",
            MAX_CONCURRENCY, config.permalink_concurrency
        )));
    }

    if config.page_limit < 1 || config.page_limit > MAX_PAGE_LIMIT {
        return Err(ConfigError::Validation(format!(
            "page-limit must be between 1 and {}, got {}",
            MAX_PAGE_LIMIT, config.page_limit
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.default_retry_after_secs < 1 {
        return Err(ConfigError::Validation(
            "default-retry-after-secs must be >= 1".to_string(),
        ));
    }

    if config.max_parent_attempts == Some(0) {
        return Err(ConfigError::Validation(
            "max-parent-attempts must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}
