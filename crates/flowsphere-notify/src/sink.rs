//! Notification delivery

use crate::types::{Notification, NotificationKind};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info, warn};

/// Receiver of operation outcome messages.
///
/// Delivery never fails; a sink that cannot present a message drops it.
pub trait NotificationSink: Send + Sync {
    /// Present `notification` to the user.
    fn notify(&self, notification: Notification);
}

impl<T: NotificationSink + ?Sized> NotificationSink for &T {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification);
    }
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
    fn notify(&self, notification: Notification) {
        (**self).notify(notification);
    }
}

/// A weak handle stands in for a surface that may have been torn down.
impl<T: NotificationSink + ?Sized> NotificationSink for Weak<T> {
    fn notify(&self, notification: Notification) {
        match self.upgrade() {
            Some(sink) => sink.notify(notification),
            None => debug!(title = %notification.title, "Dropped notification for a closed sink"),
        }
    }
}

/// Delivers to both sinks.
impl<A: NotificationSink, B: NotificationSink> NotificationSink for (A, B) {
    fn notify(&self, notification: Notification) {
        self.0.notify(notification.clone());
        self.1.notify(notification);
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        let Notification {
            kind,
            title,
            description,
        } = notification;
        if kind == NotificationKind::Destructive {
            warn!(%kind, %title, %description, "notification");
        } else {
            info!(%kind, %title, %description, "notification");
        }
    }
}

/// Records every notification, in order.
#[derive(Debug, Default)]
pub struct NotificationLog {
    entries: Mutex<Vec<Notification>>,
}

impl NotificationLog {
    /// Empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    #[must_use]
    pub fn entries(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded notifications of `kind`
    #[must_use]
    pub fn count(&self, kind: NotificationKind) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl NotificationSink for NotificationLog {
    fn notify(&self, notification: Notification) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}
