//! Notification sink for FlowSphere
//!
//! Operations report their outcome as a [`Notification`]; a
//! [`NotificationSink`] decides how it reaches the user. [`ToastQueue`] keeps
//! transient toasts, [`TracingSink`] writes them to the log.

mod config;
mod queue;
mod sink;
mod types;

pub use config::NotifyConfig;
pub use queue::{Toast, ToastId, ToastQueue};
pub use sink::{NotificationLog, NotificationSink, TracingSink};
pub use types::{Notification, NotificationKind};
