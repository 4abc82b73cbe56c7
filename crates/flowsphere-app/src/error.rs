//! Application-level error taxonomy.

use flowsphere_core::ValidationError;
use flowsphere_remote::RemoteError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by session, resource and AI operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// A gated operation was attempted without a session.
    #[error("You must be signed in to do that")]
    Unauthenticated,

    /// The request was rejected locally before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The remote service failed or refused the request.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The local AI request quota is exhausted.
    #[error("Rate limit exceeded. Please try again in {}s.", .retry_after.as_secs().max(1))]
    RateLimited {
        /// Time until a slot frees up.
        retry_after: Duration,
    },

    /// Anything else; the message is for logs, not users.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    /// Message reported by the remote service or validation, when there is one.
    #[must_use]
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Self::Remote(err) => err.remote_message(),
            Self::Validation(err) => Some(err.message.as_str()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(err.to_string())
    }
}
