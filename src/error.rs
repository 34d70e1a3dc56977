// src/error.rs

//! Error types for the scanning library.
//!
//! Only request validation and configuration loading can fail outright. Everything that
//! goes wrong once a scan is running is folded into the result as a degraded section.

use std::path::PathBuf;

use thiserror::Error;

/// Rejections raised while turning the raw target into URL components.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Invalid URL: target is empty")]
    EmptyInput,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid URL: unsupported scheme '{0}'")]
    UnsupportedScheme(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
