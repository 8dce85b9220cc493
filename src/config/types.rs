use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Tidemark
///
/// Every section and key is optional; a missing config file is the same as
/// an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub browser: BrowserConfig,
    pub proxy: ProxyConfig,
    pub output: OutputConfig,
    pub platform: PlatformConfig,
}

/// Crawl pacing and retry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Attempts per item before it is logged as unarchived
    pub max_retries: u32,

    /// Wait after a connectivity or platform failure (milliseconds)
    pub retry_delay_ms: u64,

    /// Wait after navigation before probing the page (milliseconds).
    /// Doubled when the session runs over a proxy circuit.
    pub settle_delay_ms: u64,

    /// How long to poll for an item's content container (milliseconds)
    pub content_timeout_ms: u64,

    /// Interval between content container polls (milliseconds)
    pub poll_interval_ms: u64,

    /// Pause after each scroll of a results page (milliseconds)
    pub scroll_delay_ms: u64,

    /// Upper bound on scroll iterations for one results page
    pub max_scrolls: u32,

    /// Items slower than this renew the circuit once saved (milliseconds)
    pub slow_load_ms: u64,

    /// Keep one browser across loads instead of launching one per load
    pub reuse_browser: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 10_000,
            settle_delay_ms: 1_000,
            content_timeout_ms: 30_000,
            poll_interval_ms: 500,
            scroll_delay_ms: 1_000,
            max_scrolls: 1_000,
            slow_load_ms: 15_000,
            reuse_browser: false,
        }
    }
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Settle delay for a session, doubled when anonymized
    pub fn settle_delay(&self, anonymized: bool) -> Duration {
        let base = Duration::from_millis(self.settle_delay_ms);
        if anonymized {
            base.saturating_mul(2)
        } else {
            base
        }
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }

    pub fn slow_load(&self) -> Duration {
        Duration::from_millis(self.slow_load_ms)
    }
}

/// WebDriver session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// Base URL of the WebDriver server (geckodriver)
    pub webdriver_url: String,

    /// Run the browser without a visible window
    pub headless: bool,

    /// Window width in pixels
    pub width: u32,

    /// Window height in pixels
    pub height: u32,

    /// Accept-Language sent by the browser
    pub locale: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://127.0.0.1:4444".to_string(),
            headless: true,
            width: 2000,
            height: 3000,
            locale: "en-us".to_string(),
        }
    }
}

/// Anonymizing proxy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    /// Route the browser through a Tor circuit
    pub enabled: bool,

    /// Path or name of the tor executable
    pub tor_command: String,

    /// Address the proxy listens on
    pub listen_address: String,

    /// Seconds to wait for the proxy to finish bootstrapping
    pub bootstrap_timeout_secs: u64,

    /// First candidate port (inclusive)
    pub port_range_start: u16,

    /// Last candidate port (exclusive)
    pub port_range_end: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tor_command: "tor".to_string(),
            listen_address: "127.0.0.1".to_string(),
            bootstrap_timeout_secs: 60,
            port_range_start: 10_000,
            port_range_end: 30_000,
        }
    }
}

impl ProxyConfig {
    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_secs)
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Root directory holding one subdirectory per owner
    pub data_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Upstream platform configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PlatformConfig {
    /// Scheme and host every page URL is built from
    pub base_url: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://twitter.com".to_string(),
        }
    }
}

/// Values from the command line or environment that override the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub use_tor: Option<bool>,
    pub tor_command: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub headless: Option<bool>,
    pub webdriver_url: Option<String>,
}

impl Config {
    /// Applies command-line and environment overrides on top of the file
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(use_tor) = overrides.use_tor {
            self.proxy.enabled = use_tor;
        }
        if let Some(cmd) = overrides.tor_command {
            self.proxy.tor_command = cmd;
        }
        if let Some(dir) = overrides.data_dir {
            self.output.data_dir = dir;
        }
        if let Some(headless) = overrides.headless {
            self.browser.headless = headless;
        }
        if let Some(url) = overrides.webdriver_url {
            self.browser.webdriver_url = url;
        }
    }
}
