//! Bounded, auto-dismissing toast queue

use crate::config::NotifyConfig;
use crate::sink::NotificationSink;
use crate::types::Notification;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Identifier of a queued toast
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToastId(u64);

impl fmt::Display for ToastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A notification with its display window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Queue-assigned identifier
    pub id: ToastId,
    /// The message
    pub notification: Notification,
    /// When it was shown
    pub shown_at: Instant,
    /// When it dismisses itself
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    active: VecDeque<Toast>,
    history: VecDeque<Toast>,
}

/// Holds the toasts currently on screen.
///
/// At most `limit` toasts are active; pushing beyond that evicts the oldest.
/// Expired toasts are pruned lazily whenever the queue is read.
#[derive(Debug, Default)]
pub struct ToastQueue {
    config: NotifyConfig,
    state: Mutex<QueueState>,
}

impl ToastQueue {
    /// Queue using `config`
    #[must_use]
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            config,
            state: Mutex::default(),
        }
    }

    fn guard(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Show `notification` starting at `now`
    pub fn push_at(&self, notification: Notification, now: Instant) -> ToastId {
        let mut state = self.guard();
        state.next_id += 1;
        let toast = Toast {
            id: ToastId(state.next_id),
            notification,
            shown_at: now,
            expires_at: now + self.config.duration(),
        };
        state.history.push_back(toast.clone());
        while state.history.len() > self.config.history_limit {
            state.history.pop_front();
        }
        state.active.push_back(toast);
        while state.active.len() > self.config.limit {
            state.active.pop_front();
        }
        ToastId(state.next_id)
    }

    /// Show `notification` now
    pub fn push(&self, notification: Notification) -> ToastId {
        self.push_at(notification, Instant::now())
    }

    /// Toasts still visible at `now`, oldest first
    pub fn active_at(&self, now: Instant) -> Vec<Toast> {
        let mut state = self.guard();
        state.active.retain(|toast| toast.expires_at > now);
        state.active.iter().cloned().collect()
    }

    /// Toasts visible right now
    pub fn active(&self) -> Vec<Toast> {
        self.active_at(Instant::now())
    }

    /// Dismiss a toast early; returns whether it was still visible
    pub fn dismiss(&self, id: ToastId) -> bool {
        let mut state = self.guard();
        let before = state.active.len();
        state.active.retain(|toast| toast.id != id);
        state.active.len() != before
    }

    /// Every toast ever shown, bounded by `history_limit`
    #[must_use]
    pub fn history(&self) -> Vec<Toast> {
        self.guard().history.iter().cloned().collect()
    }

    /// Remove all visible toasts and return their notifications
    pub fn drain(&self) -> Vec<Notification> {
        self.guard()
            .active
            .drain(..)
            .map(|toast| toast.notification)
            .collect()
    }
}

impl NotificationSink for ToastQueue {
    fn notify(&self, notification: Notification) {
        self.push(notification);
    }
}
