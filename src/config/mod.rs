//! Configuration module for Thread-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use thread_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Exporting channel: {}", config.slack.channel_id);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, HarvestConfig, OutputConfig, OutputFormat, SlackConfig, TOKEN_ENV_VAR,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
