//! Domain types shared by the FlowSphere sync layer.
//!
//! Everything here is plain data: identifiers, the authenticated [`Session`],
//! the [`Task`] and [`Project`] records together with their create/update
//! requests, and the [`Resource`] trait that lets the application layer treat
//! both collections uniformly.

/// Identifier types.
pub mod id;
/// Projects and their requests.
pub mod project;
/// Authenticated identity.
pub mod session;
/// Status and priority enumerations.
pub mod state;
/// Tasks and their requests.
pub mod task;
/// Serde helpers for remote column formats.
pub mod wire;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use thiserror::Error;
use time::OffsetDateTime;

pub use id::{ProjectId, TaskId, UserId};
pub use project::{NewProject, Project, ProjectPatch};
pub use session::{Session, User};
pub use state::{Priority, ProjectStatus, TaskStatus, UnknownLabel};
pub use task::{NewTask, Task, TaskPatch};

/// A request rejected before it reached the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Offending field.
    pub field: &'static str,
    /// Human-readable reason, suitable for a notification.
    pub message: String,
}

impl ValidationError {
    /// Build a validation error for `field`.
    #[must_use]
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A remote collection the application can list, create and update.
///
/// The associated constants name the remote table and the human label used in
/// notification copy ("Task created", "Failed to update project").
pub trait Resource: Clone + Debug + Send + Sync + DeserializeOwned + 'static {
    /// Row identifier.
    type Id: Copy + Eq + Hash + Ord + Display + Debug + Serialize + Send + Sync + 'static;
    /// Create request.
    type Draft: Debug + Send + Sync;
    /// Partial update request.
    type Patch: Debug + Send + Sync;

    /// Remote table name.
    const COLLECTION: &'static str;
    /// Capitalised singular label.
    const LABEL: &'static str;

    /// Row identifier of this record.
    fn id(&self) -> Self::Id;

    /// Insert timestamp, used for newest-first ordering.
    fn created_at(&self) -> OffsetDateTime;

    /// Creator recorded on the row, if any.
    fn created_by(&self) -> Option<UserId>;

    /// Reject drafts that must not be sent.
    ///
    /// # Errors
    /// Returns the first failing field.
    fn validate_draft(_draft: &Self::Draft) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Reject patches that must not be sent.
    ///
    /// # Errors
    /// Returns the first failing field.
    fn validate_patch(_patch: &Self::Patch) -> Result<(), ValidationError> {
        Ok(())
    }

    /// JSON row inserted for `draft`, stamped with its creator.
    ///
    /// # Errors
    /// Propagates serialization failures.
    fn insert_row(draft: &Self::Draft, creator: UserId) -> serde_json::Result<serde_json::Value>;

    /// JSON column set applied for `patch`, stamped with `now`.
    ///
    /// # Errors
    /// Propagates serialization failures.
    fn update_row(patch: &Self::Patch, now: OffsetDateTime) -> serde_json::Result<serde_json::Value>;
}

/// Marker for collections that expose deletion.
pub trait Deletable: Resource {}

/// Sort newest first by insert time, breaking ties by descending id.
pub fn sort_newest_first<R: Resource>(items: &mut [R]) {
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn task(id: i64, created_at: &str) -> Task {
        serde_json::from_value(json!({
            "id": id,
            "title": format!("task {id}"),
            "created_at": created_at
        }))
        .expect("decode task")
    }

    #[test]
    fn newest_first_orders_by_time_then_id() {
        let mut tasks = vec![
            task(1, "2024-05-01T09:00:00Z"),
            task(3, "2024-05-02T09:00:00Z"),
            task(2, "2024-05-02T09:00:00Z"),
        ];
        sort_newest_first(&mut tasks);
        let ids: Vec<i64> = tasks.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn validation_error_displays_its_message() {
        let err = ValidationError::new("title", "Task title is required");
        assert_eq!(err.to_string(), "Task title is required");
    }
}
