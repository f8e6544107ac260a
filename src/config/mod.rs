//! Configuration module for Atlas-Walker
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every key has a default, so a missing file or an empty file is a
//! valid configuration; command-line flags are layered on top by the binary.
//!
//! # Example
//!
//! ```no_run
//! use atlas_walker::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("atlas.toml")).unwrap();
//! println!("Concurrency: {}", config.crawler.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, FetchConfig, IdentityConfig, OutputConfig, SiteConfig,
    DEFAULT_USER_AGENTS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
