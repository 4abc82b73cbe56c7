use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a status or priority label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {field} value: {value}")]
pub struct UnknownLabel {
    /// Which enumeration was being parsed.
    pub field: &'static str,
    /// The rejected input.
    pub value: String,
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Workflow status of a task. Completion is derived from this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskStatus {
    /// Not started yet.
    #[default]
    ToDo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Completed,
}

impl TaskStatus {
    /// Label stored in the remote `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToDo => "To Do",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }

    /// Whether the status counts as done.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// All statuses in board order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::ToDo, Self::InProgress, Self::Completed]
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "todo" | "open" | "pending" => Ok(Self::ToDo),
            "inprogress" | "doing" | "active" => Ok(Self::InProgress),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            _ => Err(UnknownLabel {
                field: "task status",
                value: s.to_owned(),
            }),
        }
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ProjectStatus {
    /// Scoping, nothing started.
    #[default]
    Planning,
    /// Work under way.
    InProgress,
    /// Temporarily paused.
    OnHold,
    /// Delivered.
    Completed,
}

impl ProjectStatus {
    /// Label stored in the remote `status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "Planning",
            Self::InProgress => "In Progress",
            Self::OnHold => "On Hold",
            Self::Completed => "Completed",
        }
    }

    /// Parse a remote label, mapping anything unknown to [`ProjectStatus::Planning`].
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for ProjectStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "planning" | "planned" => Ok(Self::Planning),
            "inprogress" | "active" => Ok(Self::InProgress),
            "onhold" | "paused" => Ok(Self::OnHold),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            _ => Err(UnknownLabel {
                field: "project status",
                value: s.to_owned(),
            }),
        }
    }
}

/// Priority shared by tasks and projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Can wait.
    Low,
    /// Default importance.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// Label stored in the remote `priority` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl FromStr for Priority {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "medium" | "normal" => Ok(Self::Medium),
            "high" | "urgent" => Ok(Self::High),
            _ => Err(UnknownLabel {
                field: "priority",
                value: s.to_owned(),
            }),
        }
    }
}

macro_rules! label_serde {
    ($name:ident) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                s.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(d: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

label_serde!(TaskStatus);
label_serde!(ProjectStatus);
label_serde!(Priority);

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn task_status_accepts_board_labels_and_variants() {
        assert_eq!("To Do".parse::<TaskStatus>(), Ok(TaskStatus::ToDo));
        assert_eq!("in_progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert_eq!("DONE".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert!("later".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn only_completed_counts_as_done() {
        let done: Vec<_> = TaskStatus::all()
            .into_iter()
            .filter(|status| status.is_completed())
            .collect();
        assert_eq!(done, vec![TaskStatus::Completed]);
    }

    #[test]
    fn labels_serialize_as_display_strings() {
        let json = serde_json::to_string(&TaskStatus::InProgress).expect("serialize status");
        assert_eq!(json, "\"In Progress\"");
        let priority: Priority = serde_json::from_str("\"high\"").expect("deserialize priority");
        assert_eq!(priority, Priority::High);
    }

    #[test]
    fn unknown_project_status_falls_back_to_planning() {
        assert_eq!(ProjectStatus::parse_lenient("On Hold"), ProjectStatus::OnHold);
        assert_eq!(ProjectStatus::parse_lenient("???"), ProjectStatus::Planning);
    }
}
