//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, validating or writing a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The YAML document could not be parsed into the config model.
    #[error("failed to parse config: {source}")]
    Parse {
        /// The underlying YAML error (carries line and column).
        #[source]
        source: serde_yaml::Error,
    },

    /// A value is present but violates the schema.
    #[error("Invalid config value for `{field}`: {message}")]
    Invalid {
        /// Dotted path of the offending field (e.g. `forcing.start_date`).
        field: String,
        /// Human-readable description of the violation.
        message: String,
    },

    /// The config could not be serialized back to YAML.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// The underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file could not be written.
    #[error("failed to write config file {path}: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Creates a read error for `path`.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(source: serde_yaml::Error) -> Self {
        Self::Parse { source }
    }

    /// Creates a schema violation error for `field`.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a write error for `path`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Returns the offending field for schema violations.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}
