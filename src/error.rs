//! Error types for the resolution engine.
//!
//! [`FetchError`] never leaves a provider adapter: adapters log it and report
//! "no contribution". [`InputError`] is the only error a caller of the fusion
//! engine sees. [`ConfigError`] is raised while loading configuration and
//! reference data at startup.

use std::io;
use thiserror::Error;

/// Why an upstream call produced nothing usable.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The provider's service key is not set in the environment
    #[error("missing credential: {0} is not set")]
    MissingCredential(String),

    /// Transport failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-200 status
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Body parsed but did not have the expected layout
    #[error("unexpected response shape: {0}")]
    Shape(String),

    /// Upstream envelope carried an error result code
    #[error("upstream error {code}: {message}")]
    Upstream { code: String, message: String },

    /// Reference collection needed for the lookup is empty
    #[error("no reference points of kind {0}")]
    NoReference(&'static str),

    /// Response was well-formed but every value was missing or out of range
    #[error("no usable values")]
    Empty,

    /// The caller's deadline passed before this provider answered
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl FetchError {
    /// Build a shape error from anything printable.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    /// Transport failures and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

/// Caller-visible input problems.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("unsupported target species: {0}")]
    UnsupportedSpecies(String),

    #[error("invalid schedule window: {0} days")]
    InvalidWindow(i64),
}

/// Startup failures for configuration and reference data.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config IO: {0}")]
    Io(#[from] io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("reference data: {0}")]
    Reference(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::MissingCredential("KMA_SERVICE_KEY".into()).is_retryable());
        assert!(!FetchError::Empty.is_retryable());
    }

    #[test]
    fn messages_name_the_cause() {
        let err = FetchError::MissingCredential("OceanServiceKey".into());
        assert_eq!(err.to_string(), "missing credential: OceanServiceKey is not set");
        let err = FetchError::Upstream {
            code: "03".into(),
            message: "NODATA_ERROR".into(),
        };
        assert_eq!(err.to_string(), "upstream error 03: NODATA_ERROR");
    }
}
