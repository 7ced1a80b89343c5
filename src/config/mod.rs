//! Configuration module for MP-Archiver
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use mp_archiver::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("archiver.toml")).unwrap();
//! println!("Accounts walked in parallel: {}", config.crawl.concurrency);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{ApiConfig, Config, CrawlConfig, GateConfig, OutputConfig, SessionConfig};

pub use parser::{compute_config_hash, hash_content, load_config, load_config_with_hash, parse_config};
pub use validation::{
    validate_concurrency, validate_crawl_config, MAX_CONCURRENCY, MAX_DAYS, MAX_TTL_HOURS,
};
