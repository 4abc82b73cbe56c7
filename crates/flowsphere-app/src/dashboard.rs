//! Headline numbers for the dashboard view.

use flowsphere_core::{Project, ProjectStatus, Task, TaskStatus};
use serde::Serialize;
use time::Date;

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    /// Every task.
    pub total: usize,
    /// Tasks in `To Do`.
    pub to_do: usize,
    /// Tasks in `In Progress`.
    pub in_progress: usize,
    /// Completed tasks.
    pub completed: usize,
    /// Open tasks past their due date.
    pub overdue: usize,
}

/// Project counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProjectCounts {
    /// Every project.
    pub total: usize,
    /// Projects in progress.
    pub in_progress: usize,
    /// Completed projects.
    pub completed: usize,
    /// Projects that spent more than allocated.
    pub over_budget: usize,
    /// Mean progress over all projects.
    pub average_progress: Option<u8>,
}

/// Snapshot of the signed-in user's workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    /// Task numbers.
    pub tasks: TaskCounts,
    /// Project numbers.
    pub projects: ProjectCounts,
}

impl DashboardSummary {
    /// Summarise `tasks` and `projects` as of `today`.
    #[must_use]
    pub fn from_items(tasks: &[Task], projects: &[Project], today: Date) -> Self {
        let mut task_counts = TaskCounts {
            total: tasks.len(),
            ..TaskCounts::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::ToDo => task_counts.to_do += 1,
                TaskStatus::InProgress => task_counts.in_progress += 1,
                TaskStatus::Completed => task_counts.completed += 1,
            }
            if task.is_overdue(today) {
                task_counts.overdue += 1;
            }
        }

        let progress_sum: usize = projects.iter().map(|p| usize::from(p.progress)).sum();
        let average_progress = progress_sum
            .checked_div(projects.len())
            .and_then(|mean| u8::try_from(mean).ok());
        let project_counts = ProjectCounts {
            total: projects.len(),
            in_progress: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::InProgress)
                .count(),
            completed: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::Completed)
                .count(),
            over_budget: projects.iter().filter(|p| p.is_over_budget()).count(),
            average_progress,
        };

        Self {
            tasks: task_counts,
            projects: project_counts,
        }
    }

    /// Share of completed tasks in percent.
    #[must_use]
    pub fn completion_rate(&self) -> Option<u8> {
        (self.tasks.completed * 100)
            .checked_div(self.tasks.total)
            .and_then(|rate| u8::try_from(rate).ok())
    }
}
