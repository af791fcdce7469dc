//! Error types for tracking service calls
//!
//! Distinguishes:
//! - Transport failures (connection, timeout, TLS)
//! - API errors reported by the server as `{ error_code, message }`
//! - Responses that could not be decoded
//! - Artifact stores this client cannot write to

/// Errors returned by a [`TrackingClient`](crate::TrackingClient)
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// Request never produced a response
    #[error("http error: {message}")]
    Http { message: String },

    /// Server answered with an error payload
    #[error("tracking api error {status} ({error_code}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// MLflow error code, e.g. `INVALID_PARAMETER_VALUE`
        error_code: String,
        /// Server-provided message
        message: String,
    },

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Response body did not match the expected shape
    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    /// Artifact URI scheme cannot be written through the tracking server
    #[error("unsupported artifact store for uri '{0}'")]
    UnsupportedArtifactStore(String),

    /// Client construction failed
    #[error("client configuration error: {0}")]
    Config(String),
}

impl TrackingError {
    /// MLflow error code for resources that already exist
    pub const RESOURCE_ALREADY_EXISTS: &'static str = "RESOURCE_ALREADY_EXISTS";

    /// MLflow error code for missing resources
    pub const RESOURCE_DOES_NOT_EXIST: &'static str = "RESOURCE_DOES_NOT_EXIST";

    /// Create an invalid response error
    pub fn invalid_response(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Check if the server reported the resource as already present
    #[inline]
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Api { error_code, .. } if error_code == Self::RESOURCE_ALREADY_EXISTS)
    }

    /// Check if the error is worth retrying
    ///
    /// Transport failures, throttling and server-side errors are retryable.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result alias for tracking operations
pub type TrackingResult<T> = Result<T, TrackingError>;
