//! Process configuration helpers
//!
//! Settings are read from the process environment. A `.env` file can seed
//! variables that are not already set; see [`dotenv`].

pub mod dotenv;

pub use dotenv::{load_dotenv, parse_dotenv};

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid line {line} in {path}: {content}")]
    InvalidLine {
        path: PathBuf,
        line: usize,
        content: String,
    },
}

/// Read `name` from the environment, falling back to `default` when unset or unparsable
pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read `name` from the environment, treating empty values as unset
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
