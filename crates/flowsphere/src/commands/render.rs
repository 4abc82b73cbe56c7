use flowsphere_app::ai::{AiResponse, TimeBlock};
use flowsphere_app::DashboardSummary;
use flowsphere_core::wire::format_date;
use flowsphere_core::{Project, Task};

pub fn task_line(task: &Task) -> String {
    let mut line = format!("#{:<5} [{}]", task.id, task.status);
    if let Some(priority) = task.priority {
        line.push_str(&format!(" {priority}"));
    }
    if let Some(due) = task.due_date {
        line.push_str(&format!(" due {}", format_date(due)));
    }
    line.push_str("  ");
    line.push_str(&task.title);
    line
}

pub fn project_line(project: &Project) -> String {
    let mut line = format!(
        "#{:<5} [{}] {:>3}%  {}",
        project.id, project.status, project.progress, project.name
    );
    if let (Some(start), Some(end)) = (project.start_date, project.end_date) {
        line.push_str(&format!(" ({} to {})", format_date(start), format_date(end)));
    }
    if let Some(remaining) = project.budget_remaining() {
        let marker = if project.is_over_budget() { " over budget" } else { "" };
        line.push_str(&format!("  budget left {remaining:.2}{marker}"));
    }
    line
}

pub fn summary_lines(summary: &DashboardSummary) -> Vec<String> {
    let tasks = &summary.tasks;
    let projects = &summary.projects;
    let mut lines = vec![
        format!(
            "Tasks: {} total, {} to do, {} in progress, {} completed, {} overdue",
            tasks.total, tasks.to_do, tasks.in_progress, tasks.completed, tasks.overdue
        ),
        format!(
            "Projects: {} total, {} in progress, {} completed, {} over budget",
            projects.total, projects.in_progress, projects.completed, projects.over_budget
        ),
    ];
    if let Some(rate) = summary.completion_rate() {
        lines.push(format!("Completion rate: {rate}%"));
    }
    if let Some(progress) = projects.average_progress {
        lines.push(format!("Average project progress: {progress}%"));
    }
    lines
}

pub fn response_lines(response: &AiResponse) -> Vec<String> {
    let mut lines = vec![response.content.clone()];
    if !response.actions.is_empty() {
        lines.push(String::new());
        lines.push("Actions:".to_owned());
        lines.extend(response.actions.iter().map(|action| format!("  * {}", action.title)));
    }
    if response.fallback {
        lines.push(String::new());
        lines.extend(response.suggestions.iter().map(|s| format!("  - {s}")));
    }
    lines
}

pub fn time_block_line(block: &TimeBlock) -> String {
    format!(
        "{:>3} min  {:<6}  {}",
        block.duration_minutes, block.priority, block.title
    )
}
