//! Configuration module for Tidemark
//!
//! This module handles loading, parsing, and validating the optional TOML
//! configuration file, and layering command-line/environment overrides on top.
//!
//! # Example
//!
//! ```no_run
//! use tidemark::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("tidemark.toml")).unwrap();
//! println!("Retrying items up to {} times", config.crawler.max_retries);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, Config, ConfigOverrides, CrawlerConfig, OutputConfig, PlatformConfig,
    ProxyConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
