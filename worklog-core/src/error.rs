//! Error types for worklog-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.worklog/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("configuration error: API URL is not set")]
    MissingApiUrl,

    #[error("configuration error: API key is not set")]
    MissingApiKey,

    #[error("configuration error: API URL '{0}' must start with http:// or https://")]
    InvalidApiUrl(String),

    #[error("configuration error: {field} must be at least 1")]
    NonPositive { field: &'static str },
}
