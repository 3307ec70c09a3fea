//! Domain error types
//!
//! [`DomainError`] covers validation failures of domain values (paths, keys,
//! DSNs, identifiers). [`StoreError`] is the error returned by every port
//! adapter; it carries enough classification for the engine to decide whether
//! a failure is worth retrying.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Path is not within the local root being synchronized
    #[error("Path not within sync root: {0}")]
    PathNotInRoot(String),

    /// Malformed DSN string
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    /// The DSN does not name a bucket
    #[error("Missing bucket")]
    MissingBucket,

    /// The DSN names a credential scheme this build cannot use
    #[error("Unsupported credentials: {0}")]
    UnsupportedCredentials(String),

    /// Malformed `key#name=value,...` suffix
    #[error("Invalid extras: {0}")]
    InvalidExtras(String),

    /// Identifier that cannot be mapped to a path
    #[error("Invalid ID: {0}")]
    InvalidId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors returned by object store and remote invoker adapters
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials are missing or were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials are valid but lack permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The store asked us to slow down (HTTP 429 or 503 SlowDown)
    #[error("Slow down: {0}")]
    Throttled(String),

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Any other non-success response
    #[error("Request failed ({status}): {message}")]
    Request {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The request did not complete within the transport timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A remote invocation completed but reported failure
    #[error("Invocation failed: {0}")]
    InvocationFailed(String),

    /// A domain value passed to the adapter was invalid
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    /// Maps a non-success HTTP status to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            429 | 503 => Self::Throttled(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Request { status, message },
        }
    }

    /// Returns true for failures that may succeed if attempted again later
    ///
    /// Throttling, server errors, timeouts and network errors are transient.
    /// Authorization failures, missing objects and malformed requests are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Throttled(_) | Self::Server { .. } | Self::Timeout(_) | Self::Network(_)
        )
    }

    /// Returns true if the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
