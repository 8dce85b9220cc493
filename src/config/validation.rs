use crate::config::types::{BrowserConfig, Config, CrawlerConfig, PlatformConfig, ProxyConfig};
use crate::ConfigError;
use url::Url;

/// Longest delay or timeout accepted, in milliseconds (one day)
const MAX_DELAY_MS: u64 = 86_400_000;

/// Longest proxy bootstrap wait accepted, in seconds
const MAX_BOOTSTRAP_SECS: u64 = 3_600;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_browser_config(&config.browser)?;
    validate_proxy_config(&config.proxy)?;
    validate_platform_config(&config.platform)?;

    if config.output.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler pacing configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    let delays = [
        ("retry_delay_ms", config.retry_delay_ms),
        ("settle_delay_ms", config.settle_delay_ms),
        ("content_timeout_ms", config.content_timeout_ms),
        ("poll_interval_ms", config.poll_interval_ms),
        ("scroll_delay_ms", config.scroll_delay_ms),
        ("slow_load_ms", config.slow_load_ms),
    ];
    for (name, value) in delays {
        if value > MAX_DELAY_MS {
            return Err(ConfigError::Validation(format!(
                "{} must be <= {}ms, got {}",
                name, MAX_DELAY_MS, value
            )));
        }
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be > 0".to_string(),
        ));
    }

    if config.poll_interval_ms > config.content_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms ({}ms) cannot exceed content_timeout_ms ({}ms)",
            config.poll_interval_ms, config.content_timeout_ms
        )));
    }

    if config.max_scrolls < 1 {
        return Err(ConfigError::Validation(format!(
            "max_scrolls must be >= 1, got {}",
            config.max_scrolls
        )));
    }

    Ok(())
}

/// Validates WebDriver session configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.webdriver_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webdriver_url: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "webdriver_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.width == 0 || config.height == 0 {
        return Err(ConfigError::Validation(format!(
            "window size must be non-zero, got {}x{}",
            config.width, config.height
        )));
    }

    if config.locale.is_empty() {
        return Err(ConfigError::Validation("locale cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates proxy configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.tor_command.is_empty() {
        return Err(ConfigError::Validation(
            "tor_command cannot be empty".to_string(),
        ));
    }

    if config.bootstrap_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "bootstrap_timeout_secs must be > 0".to_string(),
        ));
    }

    if config.bootstrap_timeout_secs > MAX_BOOTSTRAP_SECS {
        return Err(ConfigError::Validation(format!(
            "bootstrap_timeout_secs must be <= {}, got {}",
            MAX_BOOTSTRAP_SECS, config.bootstrap_timeout_secs
        )));
    }

    // Two ports are needed: SOCKS and control
    if config.port_range_end <= config.port_range_start
        || config.port_range_end - config.port_range_start < 2
    {
        return Err(ConfigError::Validation(format!(
            "port range {}..{} must hold at least two ports",
            config.port_range_start, config.port_range_end
        )));
    }

    Ok(())
}

/// Validates the upstream platform URL
fn validate_platform_config(config: &PlatformConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            config.base_url
        )));
    }

    Ok(())
}
