// Error types for the library half of the crate. The binary and the menu
// layer wrap these in `anyhow::Error`; everything below the UI returns one
// of the enums here so callers can tell "nothing to show" apart from a real
// failure.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// A relationship that must hold exactly one related record held zero or
/// several.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{owner} has {found} `{relationship}` records, expected exactly one")]
pub struct CardinalityError {
    pub owner: String,
    pub relationship: String,
    pub found: usize,
}

/// Failures while turning resolved records into pricing entries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error(transparent)]
    Cardinality(#[from] CardinalityError),

    #[error("{record} is missing attribute `{attribute}`")]
    MissingAttribute {
        record: String,
        attribute: &'static str,
    },

    #[error("{record} has an invalid `{attribute}`: {value}")]
    InvalidAttribute {
        record: String,
        attribute: &'static str,
        value: serde_json::Value,
    },
}

/// Errors returned by the backend client and the action flows built on it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an unexpected status code.
    #[error("{context} failed with status {status}: {body}")]
    Status {
        context: String,
        status: StatusCode,
        body: String,
    },

    /// A refreshed token was still rejected.
    #[error("Unable to authenticate")]
    Unauthorized,

    /// The token endpoint refused the client credentials.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The request succeeded but carried no records.
    #[error("No {0}")]
    Empty(String),

    #[error("JSON deserialization error for {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("{0}")]
    Upload(String),

    #[error("unable to save {}", filename.display())]
    FileSave {
        filename: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        ApiError::Decode {
            context: context.into(),
            source,
        }
    }

    /// Whether this error means "the backend had nothing for us" rather than
    /// a failed request.
    pub fn is_empty(&self) -> bool {
        matches!(self, ApiError::Empty(_))
    }
}

/// Configuration errors raised while reading the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
