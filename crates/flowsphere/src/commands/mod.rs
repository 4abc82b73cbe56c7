use std::path::Path;

use anyhow::{Context, Result, anyhow};
use flowsphere_app::config::AppConfig;
use flowsphere_app::{AppContext, Backend};
use flowsphere_core::{
    NewProject, NewTask, ProjectId, ProjectPatch, TaskId, TaskPatch, TaskStatus,
};
use flowsphere_notify::ToastQueue;
use serde_json::json;

use crate::{ClientCommand, NewTaskArgs, ProjectCommand, TaskCommand};

mod render;

type Ctx = AppContext<Backend, ToastQueue>;

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `--clear-*` wins over an absent value; a given value is set.
#[allow(clippy::option_option)]
fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear { Some(None) } else { value.map(Some) }
}

/// Execute one command against an initialised context.
pub async fn run(command: ClientCommand, ctx: &Ctx, json: bool) -> Result<()> {
    match command {
        ClientCommand::SignIn { email, password } => {
            ctx.session()
                .sign_in(&email, &password)
                .await
                .map_err(|message| anyhow!(message))?;
            println!("Signed in as {email}");
        }
        ClientCommand::SignUp {
            email,
            password,
            name,
        } => {
            ctx.session()
                .sign_up(&email, &password, name.as_deref())
                .await
                .map_err(|message| anyhow!(message))?;
            println!("Account created for {email}");
        }
        ClientCommand::SignOut => {
            ctx.session()
                .sign_out()
                .await
                .map_err(|message| anyhow!(message))?;
            println!("Signed out");
        }
        ClientCommand::Whoami => match ctx.session().current() {
            Some(session) if json => print_json(&session.user)?,
            Some(session) => println!("{} ({})", session.user.email, session.user.id),
            None => println!("Not signed in"),
        },
        ClientCommand::Tasks(command) => run_tasks(command, ctx, json).await?,
        ClientCommand::Projects(command) => run_projects(command, ctx, json).await?,
        ClientCommand::Summary => {
            let summary = ctx.summary().await;
            if json {
                print_json(&summary)?;
            } else {
                render::summary_lines(&summary)
                    .iter()
                    .for_each(|line| println!("{line}"));
            }
        }
        ClientCommand::Ask { prompt } => {
            let response = ctx.ai().generate_response(&prompt).await?;
            if json {
                print_json(&response)?;
            } else {
                render::response_lines(&response)
                    .iter()
                    .for_each(|line| println!("{line}"));
            }
        }
        ClientCommand::ExtractTasks { text, create } => {
            let extracted = ctx.ai().extract_tasks_from_text(&text).await?;
            for title in &extracted {
                if create {
                    let task = ctx.tasks().create(&NewTask::new(title.as_str())).await?;
                    println!("{}", render::task_line(&task));
                } else {
                    println!("- {title}");
                }
            }
            if extracted.is_empty() {
                println!("No tasks found");
            }
        }
        ClientCommand::Summarize { notes } => {
            println!("{}", ctx.ai().generate_meeting_summary(&notes).await?);
        }
        ClientCommand::TimeBlocks { tasks } => {
            let tasks: Vec<&str> = tasks.iter().map(String::as_str).collect();
            let blocks = ctx.ai().suggest_time_blocks(&tasks).await?;
            if json {
                print_json(&blocks)?;
            } else {
                blocks
                    .iter()
                    .for_each(|block| println!("{}", render::time_block_line(block)));
            }
        }
    }
    Ok(())
}

async fn run_tasks(command: TaskCommand, ctx: &Ctx, json: bool) -> Result<()> {
    let tasks = ctx.tasks();
    match command {
        TaskCommand::List { status } => {
            let listed = tasks.list().await;
            let shown: Vec<_> = listed
                .iter()
                .filter(|task| status.is_none_or(|wanted| task.status == wanted))
                .collect();
            if json {
                return print_json(&shown);
            }
            if shown.is_empty() {
                println!("No tasks");
            }
            shown.iter().for_each(|task| println!("{}", render::task_line(task)));
        }
        TaskCommand::New(NewTaskArgs {
            title,
            description,
            status,
            priority,
            due,
            project,
        }) => {
            let draft = NewTask {
                title,
                description,
                status: status.unwrap_or_default(),
                priority,
                due_date: due,
                project_id: project.map(ProjectId),
                assignee_id: None,
            };
            let task = tasks.create(&draft).await?;
            println!("{}", render::task_line(&task));
        }
        TaskCommand::Update {
            id,
            title,
            description,
            clear_description,
            status,
            priority,
            due,
            clear_due,
        } => {
            let patch = TaskPatch {
                title,
                description: clearable(description, clear_description),
                status,
                priority: priority.map(Some),
                due_date: clearable(due, clear_due),
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                return Err(anyhow!("nothing to update; pass at least one field"));
            }
            let task = tasks.update(TaskId(id), &patch).await?;
            println!("{}", render::task_line(&task));
        }
        TaskCommand::Complete { id } => {
            let task = tasks
                .update(TaskId(id), &TaskPatch::status(TaskStatus::Completed))
                .await?;
            println!("{}", render::task_line(&task));
        }
        TaskCommand::Delete { id } => {
            tasks.delete(TaskId(id)).await?;
            println!("Deleted task #{id}");
        }
    }
    Ok(())
}

async fn run_projects(command: ProjectCommand, ctx: &Ctx, json: bool) -> Result<()> {
    let projects = ctx.projects();
    match command {
        ProjectCommand::List => {
            let listed = projects.list().await;
            if json {
                return print_json(&*listed);
            }
            if listed.is_empty() {
                println!("No projects");
            }
            listed
                .iter()
                .for_each(|project| println!("{}", render::project_line(project)));
        }
        ProjectCommand::New {
            name,
            description,
            priority,
            start,
            end,
            budget,
        } => {
            let draft = NewProject {
                name,
                description,
                priority,
                start_date: start,
                end_date: end,
                budget_allocated: budget,
                ..NewProject::default()
            };
            let project = projects.create(&draft).await?;
            println!("{}", render::project_line(&project));
        }
        ProjectCommand::Update {
            id,
            name,
            status,
            progress,
            spent,
        } => {
            let patch = ProjectPatch {
                name,
                status,
                progress,
                budget_spent: spent,
                ..ProjectPatch::default()
            };
            if patch.is_empty() {
                return Err(anyhow!("nothing to update; pass at least one field"));
            }
            let project = projects.update(ProjectId(id), &patch).await?;
            println!("{}", render::project_line(&project));
        }
    }
    Ok(())
}

/// Report configuration problems without touching the network.
pub fn check_config(config: &AppConfig, path: &Path) -> Result<()> {
    let report = config.validate();
    let source = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    let summary = json!({
        "app": config.app.name,
        "version": config.app.version,
        "environment": config.app.environment,
        "config": source,
        "database": config.database_enabled(),
        "offline": config.features.offline_mode,
        "ai": config.ai_enabled(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    for error in &report.errors {
        println!("error: {error}");
    }
    report
        .ensure_valid()
        .with_context(|| format!("{} has errors", path.display()))
}

/// Flush pending notifications to stderr.
pub fn print_toasts(queue: &ToastQueue) {
    for notification in queue.drain() {
        eprintln!("{notification}");
    }
}
