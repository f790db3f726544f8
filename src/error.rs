//! Error types.
//!
//! Two families, kept apart on purpose:
//!
//! - [`ApiError`] is what a handler returns when a request cannot be served.
//!   It is a closed set; each variant has a fixed HTTP status.
//! - [`Error`] surfaces infrastructure failures: binding the listener, loading
//!   TLS material, rejecting a route table. These never become HTTP responses.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Request-scoped handler failure.
///
/// Every variant except [`ApiError::Unrecognized`] maps to a fixed status and
/// an error envelope without a `reason`. `Unrecognized` carries the
/// description of an error that fell outside the taxonomy; it is answered
/// with `500` and the description as `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("bad request")]
    BadRequest,
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("unprocessable entity")]
    UnprocessableEntity,
    #[error("{0}")]
    Unrecognized(String),
}

impl ApiError {
    /// Wraps any error value outside the sentinel set.
    pub fn other(err: impl fmt::Display) -> Self {
        Self::Unrecognized(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest          => StatusCode::BAD_REQUEST,
            Self::Unauthorized        => StatusCode::UNAUTHORIZED,
            Self::NotFound            => StatusCode::NOT_FOUND,
            Self::Conflict            => StatusCode::CONFLICT,
            Self::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unrecognized(_)     => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `true` for every variant but [`ApiError::Unrecognized`].
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

/// The error type returned by tessera's fallible setup and serving operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls: {0}")]
    Tls(String),

    #[error("config: {0}")]
    Config(String),

    #[error("route: {0}")]
    Route(String),

    #[error("logging: {0}")]
    Logging(String),
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
