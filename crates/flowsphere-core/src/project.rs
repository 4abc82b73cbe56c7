use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::id::{ProjectId, UserId};
use crate::state::{Priority, ProjectStatus};
use crate::{Resource, ValidationError, wire};

/// Upper bound of [`Project::progress`].
pub const MAX_PROGRESS: u8 = 100;

/// A multi-task outcome with a date range and budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProjectRow", into = "ProjectRow")]
pub struct Project {
    /// Remote row identifier.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Lifecycle status.
    pub status: ProjectStatus,
    /// Optional priority.
    pub priority: Option<Priority>,
    /// Planned start.
    pub start_date: Option<Date>,
    /// Planned end.
    pub end_date: Option<Date>,
    /// Budget allocated.
    pub budget_allocated: Option<f64>,
    /// Budget spent so far.
    pub budget_spent: Option<f64>,
    /// Completion percentage, `0..=100`.
    pub progress: u8,
    /// Creator stamped at insert time.
    pub created_by: Option<UserId>,
    /// Insert timestamp.
    pub created_at: OffsetDateTime,
    /// Last update timestamp.
    pub updated_at: Option<OffsetDateTime>,
}

impl Project {
    /// Remaining budget, when an allocation is known.
    #[must_use]
    pub fn budget_remaining(&self) -> Option<f64> {
        self.budget_allocated
            .map(|allocated| allocated - self.budget_spent.unwrap_or(0.0))
    }

    /// Whether spending has exceeded the allocation.
    #[must_use]
    pub fn is_over_budget(&self) -> bool {
        self.budget_remaining().is_some_and(|remaining| remaining < 0.0)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, f64::from(MAX_PROGRESS)) as u8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectRow {
    id: ProjectId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default, with = "wire::date_opt")]
    start_date: Option<Date>,
    #[serde(default, with = "wire::date_opt")]
    end_date: Option<Date>,
    #[serde(default)]
    budget_allocated: Option<f64>,
    #[serde(default)]
    budget_spent: Option<f64>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    created_by: Option<UserId>,
    #[serde(with = "wire::timestamp")]
    created_at: OffsetDateTime,
    #[serde(default, with = "wire::timestamp_opt")]
    updated_at: Option<OffsetDateTime>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name.unwrap_or_default(),
            description: row.description.filter(|text| !text.is_empty()),
            status: row
                .status
                .as_deref()
                .map(ProjectStatus::parse_lenient)
                .unwrap_or_default(),
            priority: row.priority.as_deref().and_then(|raw| raw.parse().ok()),
            start_date: row.start_date,
            end_date: row.end_date,
            budget_allocated: row.budget_allocated,
            budget_spent: row.budget_spent,
            progress: row.progress.map_or(0, clamp_progress),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<Project> for ProjectRow {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: Some(project.name),
            description: project.description,
            status: Some(project.status.as_str().to_owned()),
            priority: project.priority.map(|p| p.as_str().to_owned()),
            start_date: project.start_date,
            end_date: project.end_date,
            budget_allocated: project.budget_allocated,
            budget_spent: project.budget_spent,
            progress: Some(f64::from(project.progress)),
            created_by: project.created_by,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// Request to create a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewProject {
    /// Required name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Initial status (defaults to "Planning").
    pub status: ProjectStatus,
    /// Optional priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Planned start.
    #[serde(skip_serializing_if = "Option::is_none", with = "wire::date_opt")]
    pub start_date: Option<Date>,
    /// Planned end.
    #[serde(skip_serializing_if = "Option::is_none", with = "wire::date_opt")]
    pub end_date: Option<Date>,
    /// Budget allocated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_allocated: Option<f64>,
}

impl NewProject {
    /// Start a request with the given name and defaults for everything else.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the planned date range.
    #[must_use]
    pub const fn between(mut self, start: Date, end: Date) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    /// Set the allocated budget.
    #[must_use]
    pub const fn with_budget(mut self, allocated: f64) -> Self {
        self.budget_allocated = Some(allocated);
        self
    }
}

#[derive(Serialize)]
struct ProjectInsert<'a> {
    #[serde(flatten)]
    draft: &'a NewProject,
    progress: u8,
    created_by: UserId,
}

/// Partial update of a project. Absent fields are left untouched.
///
/// Nullable columns take `Option<Option<_>>`; `Some(None)` clears them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[allow(clippy::option_option)]
pub struct ProjectPatch {
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New or cleared description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    /// New or cleared priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    /// New or cleared start date.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "wire::date_patch::serialize")]
    pub start_date: Option<Option<Date>>,
    /// New or cleared end date.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "wire::date_patch::serialize")]
    pub end_date: Option<Option<Date>>,
    /// New or cleared allocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_allocated: Option<Option<f64>>,
    /// New spend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_spent: Option<f64>,
    /// New completion percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl ProjectPatch {
    /// Patch that only changes the progress.
    #[must_use]
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: ProjectStatus) -> Self {
        Self {
            status: Some(status),
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
struct ProjectUpdate<'a> {
    #[serde(flatten)]
    patch: &'a ProjectPatch,
    #[serde(with = "wire::timestamp")]
    updated_at: OffsetDateTime,
}

fn check_range(start: Option<Date>, end: Option<Date>) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(ValidationError::new(
            "end_date",
            "Project end date must not precede its start date",
        )),
        _ => Ok(()),
    }
}

impl Resource for Project {
    type Id = ProjectId;
    type Draft = NewProject;
    type Patch = ProjectPatch;

    const COLLECTION: &'static str = "projects";
    const LABEL: &'static str = "Project";

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
        if draft.name.trim().is_empty() {
            return Err(ValidationError::new("name", "Project name is required"));
        }
        if draft.budget_allocated.is_some_and(|budget| budget < 0.0) {
            return Err(ValidationError::new("budget_allocated", "Budget must not be negative"));
        }
        check_range(draft.start_date, draft.end_date)
    }

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError> {
        if patch.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ValidationError::new("name", "Project name must not be empty"));
        }
        if patch.progress.is_some_and(|progress| progress > MAX_PROGRESS) {
            return Err(ValidationError::new("progress", "Progress must be between 0 and 100"));
        }
        if patch.budget_allocated.flatten().is_some_and(|budget| budget < 0.0) {
            return Err(ValidationError::new("budget_allocated", "Budget must not be negative"));
        }
        check_range(patch.start_date.flatten(), patch.end_date.flatten())
    }

    fn insert_row(draft: &Self::Draft, creator: UserId) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(ProjectInsert {
            draft,
            progress: 0,
            created_by: creator,
        })
    }

    fn update_row(patch: &Self::Patch, now: OffsetDateTime) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(ProjectUpdate {
            patch,
            updated_at: now,
        })
    }
}
