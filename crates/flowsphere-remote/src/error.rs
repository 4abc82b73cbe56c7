//! Error types for remote store and auth operations.

use thiserror::Error;

/// Errors that can occur while talking to the remote service.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a failure status.
    #[error("{message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message reported by the service.
        message: String,
        /// Service-specific error code, if any.
        code: Option<String>,
    },

    /// Credentials were rejected or the auth service refused the request.
    #[error("{0}")]
    Auth(String),

    /// A response body could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No row matched the request.
    #[error("No {collection} row matched the request")]
    NotFound {
        /// Collection that was queried.
        collection: String,
    },

    /// The remote database is disabled by configuration.
    #[error("Remote database is not configured")]
    NotConfigured,

    /// Local snapshot I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other unclassified error.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Build an API failure without a service code.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            code: None,
        }
    }

    /// Message reported by the service itself, suitable for showing to a user.
    #[must_use]
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } | Self::Auth(message) if !message.trim().is_empty() => {
                Some(message)
            }
            _ => None,
        }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Api { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_and_throttling_failures_are_transient() {
        assert!(RemoteError::api(503, "unavailable").is_transient());
        assert!(RemoteError::api(429, "slow down").is_transient());
        assert!(RemoteError::api(408, "timeout").is_transient());
        assert!(!RemoteError::api(400, "bad column").is_transient());
        assert!(!RemoteError::Auth("Invalid login credentials".into()).is_transient());
        assert!(!RemoteError::NotConfigured.is_transient());
    }

    #[test]
    fn remote_message_only_exposes_service_text() {
        assert_eq!(
            RemoteError::api(409, "duplicate key").remote_message(),
            Some("duplicate key")
        );
        assert_eq!(RemoteError::api(500, "  ").remote_message(), None);
        assert_eq!(RemoteError::Other("boom".into()).remote_message(), None);
    }
}
