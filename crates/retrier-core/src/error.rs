//! Error types for retrier-core

use thiserror::Error;

/// Result type alias using retrier-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration value or format
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A config document that is not valid YAML for its schema
    #[error("Failed to parse {path}: {source}")]
    YamlParse {
        path: String,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown retry strategy name
    #[error("Unknown retry strategy: {name}. Valid strategies: none, fixed-delay, exponential-backoff, linear-backoff")]
    InvalidStrategy { name: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a YAML parse error for the document at `path`
    pub fn yaml_parse(path: impl Into<String>, source: serde_yaml_ng::Error) -> Self {
        Self::YamlParse {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid strategy error
    pub fn invalid_strategy(name: impl Into<String>) -> Self {
        Self::InvalidStrategy { name: name.into() }
    }

    /// The bare reason, without the variant prefix for invalid configs
    pub fn reason(&self) -> String {
        match self {
            Self::InvalidConfig { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = Error::invalid_config("RETRIER_DELAY_MS must be a non-negative number");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: RETRIER_DELAY_MS must be a non-negative number"
        );
    }

    #[test]
    fn test_reason_strips_prefix() {
        let err = Error::invalid_config("max-attempts must be at least 1 (got 0)");
        assert_eq!(err.reason(), "max-attempts must be at least 1 (got 0)");
    }

    #[test]
    fn test_invalid_strategy_lists_choices() {
        let err = Error::invalid_strategy("random-walk");
        let msg = err.to_string();
        assert!(msg.contains("random-walk"));
        assert!(msg.contains("fixed-delay"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
