//! Uniform error taxonomy
//!
//! Every driver operation fails with one of these kinds. The `try_*`
//! variants of the driver contract never surface I/O failures at all;
//! everything else maps remote status codes and local stream errors into
//! this enum so callers can match on the kind without knowing which
//! backend produced it.

use thiserror::Error;

/// Result alias used across the arbiter crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by drivers, the transport, and the registry.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing mandatory credentials or a malformed configuration document.
    #[error("configuration error: {0}")]
    Config(String),

    /// 404 from a remote driver, or a local open-for-read failure.
    #[error("not found: {0}")]
    NotFound(String),

    /// 401/403 from a remote driver.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Transport failure or timeout, after retries were exhausted.
    #[error("network error: {0}")]
    Network(String),

    /// Remaining 5xx after retries, or a malformed listing response.
    #[error("backend error: {0}")]
    Backend(String),

    /// A 4xx other than 401/403/404.
    #[error("client error ({status}): {message}")]
    Client {
        /// The HTTP status code that produced this error
        status: u16,
        /// Context describing the failed operation
        message: String,
    },

    /// The driver cannot perform this operation (e.g. glob over plain HTTP).
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Signing failure: bad PEM material, undecodable key, or a failed
    /// token grant.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Local filesystem read/write failure.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// The filesystem path involved
        path: String,
        /// The underlying error
        source: std::io::Error,
    },
}

impl Error {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Classifies a remote HTTP status into the taxonomy.
    ///
    /// `synthetic` marks statuses fabricated by the transport for
    /// network-layer failures; those become [`Error::Network`] instead of
    /// [`Error::Backend`].
    pub fn from_status(status: u16, synthetic: bool, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            404 => Error::NotFound(context),
            401 | 403 => Error::PermissionDenied(context),
            400..=499 => Error::Client {
                status,
                message: context,
            },
            _ if synthetic => Error::Network(context),
            _ => Error::Backend(format!("{} ({})", context, status)),
        }
    }
}
