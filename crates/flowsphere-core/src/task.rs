use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::id::{ProjectId, TaskId, UserId};
use crate::state::{Priority, TaskStatus};
use crate::{Deletable, Resource, ValidationError, wire};

/// A unit of work tracked on the dashboard.
///
/// Completion is not stored separately: [`Task::completed`] is derived from
/// [`Task::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TaskRow", into = "TaskRow")]
pub struct Task {
    /// Remote row identifier.
    pub id: TaskId,
    /// Short title.
    pub title: String,
    /// Optional long-form description.
    pub description: Option<String>,
    /// Workflow status.
    pub status: TaskStatus,
    /// Optional priority.
    pub priority: Option<Priority>,
    /// Optional due date.
    pub due_date: Option<Date>,
    /// Owning project, if any.
    pub project_id: Option<ProjectId>,
    /// Assigned user, if any.
    pub assignee_id: Option<UserId>,
    /// Creator stamped at insert time.
    pub created_by: Option<UserId>,
    /// Insert timestamp.
    pub created_at: OffsetDateTime,
    /// Last update timestamp.
    pub updated_at: Option<OffsetDateTime>,
}

impl Task {
    /// Whether the task is done.
    #[must_use]
    pub const fn completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Whether the task is past its due date on `today` and still open.
    #[must_use]
    pub fn is_overdue(&self, today: Date) -> bool {
        !self.completed() && self.due_date.is_some_and(|due| due < today)
    }
}

/// Row shape of the remote `tasks` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskRow {
    id: TaskId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default, with = "wire::date_opt")]
    due_date: Option<Date>,
    #[serde(default)]
    project_id: Option<ProjectId>,
    #[serde(default)]
    assignee_id: Option<UserId>,
    #[serde(default)]
    created_by: Option<UserId>,
    #[serde(with = "wire::timestamp")]
    created_at: OffsetDateTime,
    #[serde(default, with = "wire::timestamp_opt")]
    updated_at: Option<OffsetDateTime>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        // Legacy rows may only carry the boolean flag.
        let status = match row.status.as_deref().map(str::parse::<TaskStatus>) {
            Some(Ok(status)) => status,
            _ if row.completed == Some(true) => TaskStatus::Completed,
            _ => TaskStatus::ToDo,
        };
        Self {
            id: row.id,
            title: row.title.unwrap_or_default(),
            description: row.description.filter(|text| !text.is_empty()),
            status,
            priority: row.priority.as_deref().and_then(|raw| raw.parse().ok()),
            due_date: row.due_date,
            project_id: row.project_id,
            assignee_id: row.assignee_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<Task> for TaskRow {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: Some(task.title),
            description: task.description,
            status: Some(task.status.as_str().to_owned()),
            priority: task.priority.map(|p| p.as_str().to_owned()),
            completed: Some(task.status.is_completed()),
            due_date: task.due_date,
            project_id: task.project_id,
            assignee_id: task.assignee_id,
            created_by: task.created_by,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Request to create a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewTask {
    /// Required title.
    pub title: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Initial status (defaults to "To Do").
    pub status: TaskStatus,
    /// Optional priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Optional due date.
    #[serde(skip_serializing_if = "Option::is_none", with = "wire::date_opt")]
    pub due_date: Option<Date>,
    /// Optional owning project.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Optional assignee.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
}

impl NewTask {
    /// Start a request with the given title and defaults for everything else.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the initial status.
    #[must_use]
    pub const fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the due date.
    #[must_use]
    pub const fn with_due_date(mut self, due: Date) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Attach the task to a project.
    #[must_use]
    pub const fn in_project(mut self, project: ProjectId) -> Self {
        self.project_id = Some(project);
        self
    }

    /// Assign the task.
    #[must_use]
    pub const fn assigned_to(mut self, user: UserId) -> Self {
        self.assignee_id = Some(user);
        self
    }
}

#[derive(Serialize)]
struct TaskInsert<'a> {
    #[serde(flatten)]
    draft: &'a NewTask,
    completed: bool,
    created_by: UserId,
}

/// Partial update of a task. Absent fields are left untouched.
///
/// Nullable columns take `Option<Option<_>>`: `None` leaves the column alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[allow(clippy::option_option)]
pub struct TaskPatch {
    /// New title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New or cleared description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    /// New or cleared priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    /// New or cleared due date.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "wire::date_patch::serialize")]
    pub due_date: Option<Option<Date>>,
    /// Move to another project, or detach from any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<ProjectId>>,
    /// Reassign or unassign.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Option<UserId>>,
}

impl TaskPatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that only changes the title.
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Patch that removes the due date.
    #[must_use]
    pub fn clear_due_date() -> Self {
        Self {
            due_date: Some(None),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Serialize)]
struct TaskUpdate<'a> {
    #[serde(flatten)]
    patch: &'a TaskPatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<bool>,
    #[serde(with = "wire::timestamp")]
    updated_at: OffsetDateTime,
}

impl Resource for Task {
    type Id = TaskId;
    type Draft = NewTask;
    type Patch = TaskPatch;

    const COLLECTION: &'static str = "tasks";
    const LABEL: &'static str = "Task";

    fn id(&self) -> Self::Id {
        self.id
    }

    fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    fn validate_draft(draft: &Self::Draft) -> Result<(), ValidationError> {
        if draft.title.trim().is_empty() {
            return Err(ValidationError::new("title", "Task title is required"));
        }
        Ok(())
    }

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError> {
        if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(ValidationError::new("title", "Task title must not be empty"));
        }
        Ok(())
    }

    fn insert_row(draft: &Self::Draft, creator: UserId) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(TaskInsert {
            draft,
            completed: draft.status.is_completed(),
            created_by: creator,
        })
    }

    fn update_row(patch: &Self::Patch, now: OffsetDateTime) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(TaskUpdate {
            patch,
            completed: patch.status.map(TaskStatus::is_completed),
            updated_at: now,
        })
    }
}

impl Deletable for Task {}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use serde_json::json;
    use time::macros::{date, datetime};

    #[test]
    fn rows_with_status_ignore_the_legacy_flag() {
        let task: Task = serde_json::from_value(json!({
            "id": 1,
            "title": "Write report",
            "status": "In Progress",
            "completed": true,
            "created_at": "2024-05-01T09:00:00+00:00"
        }))
        .expect("decode task row");
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(!task.completed());
    }

    #[test]
    fn legacy_rows_without_status_use_the_completed_flag() {
        let task: Task = serde_json::from_value(json!({
            "id": 2,
            "title": null,
            "completed": true,
            "priority": "weird",
            "created_at": "2024-05-01 09:00:00"
        }))
        .expect("decode task row");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.title, "");
        assert_eq!(task.priority, None);
    }

    #[test]
    fn serialized_task_writes_derived_completed_column() {
        let task = Task {
            id: TaskId(3),
            title: "Ship".into(),
            description: None,
            status: TaskStatus::Completed,
            priority: Some(Priority::High),
            due_date: Some(date!(2024 - 06 - 01)),
            project_id: None,
            assignee_id: None,
            created_by: None,
            created_at: datetime!(2024-05-01 09:00 UTC),
            updated_at: None,
        };
        let value = serde_json::to_value(&task).expect("encode task");
        assert_eq!(value["completed"], json!(true));
        assert_eq!(value["status"], json!("Completed"));
        assert_eq!(value["due_date"], json!("2024-06-01"));
    }

    #[test]
    fn insert_row_stamps_creator_and_open_completion() {
        let creator = UserId::new();
        let draft = NewTask::new("Plan sprint").with_priority(Priority::Low);
        let row = Task::insert_row(&draft, creator).expect("encode insert");
        assert_eq!(row["title"], json!("Plan sprint"));
        assert_eq!(row["status"], json!("To Do"));
        assert_eq!(row["completed"], json!(false));
        assert_eq!(row["created_by"], json!(creator.to_string()));
        assert!(row.get("description").is_none());
    }

    #[test]
    fn status_patch_keeps_completed_in_step() {
        let now = datetime!(2024-05-02 10:00 UTC);
        let row = Task::update_row(&TaskPatch::status(TaskStatus::Completed), now)
            .expect("encode update");
        assert_eq!(row["status"], json!("Completed"));
        assert_eq!(row["completed"], json!(true));
        assert_eq!(row["updated_at"], json!("2024-05-02T10:00:00Z"));

        let row = Task::update_row(&TaskPatch::title("Renamed"), now).expect("encode update");
        assert!(row.get("completed").is_none());
    }

    #[test]
    fn patch_clears_nullable_columns_with_null() {
        let now = datetime!(2024-05-02 10:00 UTC);
        let row = Task::update_row(&TaskPatch::clear_due_date(), now).expect("encode update");
        assert_eq!(row["due_date"], json!(null));
        assert!(row.get("description").is_none());

        let patch = TaskPatch {
            description: Some(None),
            project_id: Some(None),
            assignee_id: Some(None),
            priority: Some(Some(Priority::Low)),
            due_date: Some(Some(date!(2024 - 06 - 01))),
            ..TaskPatch::default()
        };
        let row = Task::update_row(&patch, now).expect("encode update");
        assert_eq!(row["description"], json!(null));
        assert_eq!(row["project_id"], json!(null));
        assert_eq!(row["assignee_id"], json!(null));
        assert_eq!(row["priority"], json!("Low"));
        assert_eq!(row["due_date"], json!("2024-06-01"));
        assert!(!TaskPatch::clear_due_date().is_empty());
    }

    #[test]
    fn blank_titles_are_rejected() {
        assert!(Task::validate_draft(&NewTask::new("   ")).is_err());
        assert!(Task::validate_draft(&NewTask::new("ok")).is_ok());
        assert!(Task::validate_patch(&TaskPatch::title("")).is_err());
    }

    #[test]
    fn overdue_only_applies_to_open_tasks() {
        let mut task: Task = serde_json::from_value(json!({
            "id": 4,
            "title": "Pay invoice",
            "status": "To Do",
            "due_date": "2024-05-01",
            "created_at": "2024-04-01T00:00:00Z"
        }))
        .expect("decode task row");
        assert!(task.is_overdue(date!(2024 - 05 - 02)));
        task.status = TaskStatus::Completed;
        assert!(!task.is_overdue(date!(2024 - 05 - 02)));
    }
}
