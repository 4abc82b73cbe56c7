use crate::id::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Authenticated user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque identity.
    pub id: UserId,
    /// Sign-in email.
    pub email: String,
    /// Optional display name captured at sign-up.
    #[serde(default)]
    pub name: Option<String>,
}

/// Authenticated identity context gating data access.
///
/// Created on sign-in, cleared on sign-out or expiry. Consumers only ever see
/// it by shared reference.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The signed-in user.
    pub user: User,
    /// Bearer token attached to remote calls.
    pub access_token: String,
    /// Token used to renew the session, when the service issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry, when known.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl Session {
    /// Identity of the signed-in user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user.id
    }

    /// Whether the session has passed its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
