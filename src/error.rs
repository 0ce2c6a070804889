//! Custom error types for the collector.
//!
//! This module defines the primary error type, `CollectorError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of errors a collection tick can
//! run into, from transport problems to semantic configuration issues.
//!
//! ## Error Hierarchy
//!
//! `CollectorError` is an enum that consolidates the error sources:
//!
//! - **`Http`**: Wraps `reqwest::Error`, covering connection refusals, timeouts,
//!   and body-decoding failures on both the proxy and store wires.
//! - **`Upstream`**: A non-success HTTP status from the web services proxy. The
//!   operation name is carried so log lines can say which endpoint failed.
//! - **`Store`**: A failed write or query against the time-series store, with
//!   the operation name and whatever detail the store returned.
//! - **`Json`**: Wraps `serde_json::Error` for malformed response bodies.
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or
//!   format issues in the configuration file.
//! - **`Configuration`**: Semantic configuration errors that pass parsing but
//!   are logically invalid (e.g., a zero polling interval). These are caught
//!   by the validation step.
//!
//! By using `#[from]`, `CollectorError` can be seamlessly created from the
//! underlying error types, so collector bodies propagate with `?`. Errors stop
//! at the fan-out executor, which logs them; they never reach the scheduler
//! loop.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CollectorError>;

/// Unified error type for every collection and startup operation.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// HTTP transport failure on either wire.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the web services proxy.
    #[error("Proxy request '{operation}' failed with status {status}")]
    Upstream {
        /// Endpoint or operation name, e.g. `analysed-drive-statistics`.
        operation: String,
        /// HTTP status code returned by the proxy.
        status: u16,
    },

    /// Failed write or query against the time-series store.
    #[error("Store operation '{operation}' failed: {detail}")]
    Store {
        /// Store operation name, e.g. `write` or `max_event_id`.
        operation: String,
        /// Detail reported by the store, if any.
        detail: String,
    },

    /// Malformed JSON in a response body.
    #[error("Malformed response body: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file parsing or merging failure.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration that parsed but is semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl CollectorError {
    /// Build a store error with an operation name and detail.
    pub fn store(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        CollectorError::Store {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Build an upstream error from an operation name and a status code.
    pub fn upstream(operation: impl Into<String>, status: u16) -> Self {
        CollectorError::Upstream {
            operation: operation.into(),
            status,
        }
    }
}

impl From<figment::Error> for CollectorError {
    fn from(value: figment::Error) -> Self {
        CollectorError::Config(Box::new(value))
    }
}
