//! Notification types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual category of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Neutral information
    Info,
    /// An operation completed
    Success,
    /// An operation failed
    Destructive,
}

impl NotificationKind {
    /// Lowercase label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Destructive => "destructive",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient message about an operation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Category
    pub kind: NotificationKind,
    /// Short headline
    pub title: String,
    /// One-sentence detail
    pub description: String,
}

impl Notification {
    /// Create a notification of any kind
    pub fn new(kind: NotificationKind, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description: description.into(),
        }
    }

    /// Neutral notification
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, title, description)
    }

    /// Success notification
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, title, description)
    }

    /// Failure notification
    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationKind::Destructive, title, description)
    }

    /// Whether this reports a failure
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self.kind, NotificationKind::Destructive)
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            write!(f, "[{}] {}", self.kind, self.title)
        } else {
            write!(f, "[{}] {}: {}", self.kind, self.title, self.description)
        }
    }
}
