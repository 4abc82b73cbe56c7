//! CLI entry point for FlowSphere.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flowsphere_app::AppContext;
use flowsphere_app::config::{AppConfig, CONFIG_FILE};
use flowsphere_core::{Priority, ProjectStatus, TaskStatus};
use time::Date;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod commands;

const APP_DIR: &str = "flowsphere";
const SESSION_FILE: &str = "session.json";
const OFFLINE_STORE_FILE: &str = "offline.json";

/// Tasks, projects and an assistant, synced with your FlowSphere workspace.
#[derive(Parser, Debug)]
#[command(name = "flowsphere", version, about = "FlowSphere: productivity dashboard sync client")]
struct Cli {
    /// Configuration file (defaults to ./flowsphere.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the local offline store instead of the remote database.
    #[arg(long, global = true)]
    offline: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate configuration and report disabled features.
    CheckConfig,

    #[command(flatten)]
    Client(ClientCommand),
}

/// Commands that run against the backend.
#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// Sign in with email and password.
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account.
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },

    /// End the current session.
    SignOut,

    /// Show the signed-in user.
    Whoami,

    /// Manage tasks.
    #[command(subcommand)]
    Tasks(TaskCommand),

    /// Manage projects.
    #[command(subcommand)]
    Projects(ProjectCommand),

    /// Task and project numbers.
    Summary,

    /// Ask the assistant.
    Ask {
        prompt: String,
    },

    /// Pull actionable tasks out of free text.
    ExtractTasks {
        text: String,
        /// Create each extracted task.
        #[arg(long)]
        create: bool,
    },

    /// Summarise meeting notes.
    Summarize {
        notes: String,
    },

    /// Suggest focus blocks for tasks.
    TimeBlocks {
        #[arg(required = true)]
        tasks: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    /// List tasks, newest first.
    List {
        #[arg(long, value_parser = parse_task_status)]
        status: Option<TaskStatus>,
    },

    /// Create a task.
    New(NewTaskArgs),

    /// Change fields of a task.
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        /// Remove the description.
        #[arg(long)]
        clear_description: bool,
        #[arg(long, value_parser = parse_task_status)]
        status: Option<TaskStatus>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long, value_parser = parse_date, conflicts_with = "clear_due")]
        due: Option<Date>,
        /// Remove the due date.
        #[arg(long)]
        clear_due: bool,
    },

    /// Mark a task completed.
    Complete {
        #[arg(long)]
        id: i64,
    },

    /// Delete a task.
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[derive(Args, Debug)]
struct NewTaskArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, value_parser = parse_task_status)]
    status: Option<TaskStatus>,
    #[arg(long, value_parser = parse_priority)]
    priority: Option<Priority>,
    #[arg(long, value_parser = parse_date)]
    due: Option<Date>,
    #[arg(long)]
    project: Option<i64>,
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    /// List projects, newest first.
    List,

    /// Create a project.
    New {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long, value_parser = parse_date, requires = "end")]
        start: Option<Date>,
        #[arg(long, value_parser = parse_date, requires = "start")]
        end: Option<Date>,
        #[arg(long)]
        budget: Option<f64>,
    },

    /// Change fields of a project.
    Update {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_project_status)]
        status: Option<ProjectStatus>,
        #[arg(long)]
        progress: Option<u8>,
        #[arg(long)]
        spent: Option<f64>,
    },
}

fn parse_task_status(raw: &str) -> Result<TaskStatus, String> {
    raw.parse().map_err(|err| format!("{err}"))
}

fn parse_project_status(raw: &str) -> Result<ProjectStatus, String> {
    raw.parse().map_err(|err| format!("{err}"))
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    raw.parse().map_err(|err| format!("{err}"))
}

fn parse_date(raw: &str) -> Result<Date, String> {
    flowsphere_core::wire::parse_date(raw).ok_or_else(|| format!("expected YYYY-MM-DD, got '{raw}'"))
}

fn main() -> Result<()> {
    let Cli {
        config,
        offline,
        json,
        cmd,
    } = Cli::parse();

    install_tracing();

    let config_path = config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = AppConfig::load_with_env(&config_path)?;
    if offline {
        config.features.offline_mode = true;
    }
    if config.features.offline_mode && config.features.offline_store.is_none() {
        config.features.offline_store = data_dir().map(|dir| dir.join(OFFLINE_STORE_FILE));
    }

    let cmd = match cmd {
        Command::CheckConfig => return commands::check_config(&config, &config_path),
        Command::Client(cmd) => cmd,
    };
    config.validate().ensure_valid()?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async {
        let session_file = config_dir().map(|dir| dir.join(SESSION_FILE));
        let ctx = AppContext::from_config(&config, session_file.as_deref())?;
        ctx.start().await;
        let outcome = commands::run(cmd, &ctx, json).await;
        commands::print_toasts(ctx.sink());
        outcome
    })
}

fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR))
}

fn install_tracing() {
    // RUST_LOG overrides; INFO by default.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_task_new_command() {
        let cli = Cli::parse_from([
            "flowsphere",
            "tasks",
            "new",
            "--title",
            "Write report",
            "--priority",
            "high",
            "--due",
            "2024-06-01",
            "--status",
            "in progress",
        ]);

        match cli.cmd {
            Command::Client(ClientCommand::Tasks(TaskCommand::New(args))) => {
                assert_eq!(args.title, "Write report");
                assert_eq!(args.priority, Some(Priority::High));
                assert_eq!(args.status, Some(TaskStatus::InProgress));
                assert_eq!(args.due.map(|d| d.to_string()).as_deref(), Some("2024-06-01"));
            }
            other => panic!("expected tasks new, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["flowsphere", "projects", "list", "--offline", "--json"]);
        assert!(cli.offline);
        assert!(cli.json);
        assert!(matches!(cli.cmd, Command::Client(ClientCommand::Projects(ProjectCommand::List))));
    }

    #[test]
    fn project_dates_come_in_pairs() {
        let result = Cli::try_parse_from([
            "flowsphere",
            "projects",
            "new",
            "--name",
            "Launch",
            "--start",
            "2024-06-01",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn clearing_and_setting_the_due_date_conflict() {
        let both = Cli::try_parse_from([
            "flowsphere", "tasks", "update", "--id", "7", "--due", "2024-06-01", "--clear-due",
        ]);
        assert!(both.is_err());
        let cli = Cli::parse_from(["flowsphere", "tasks", "update", "--id", "7", "--clear-due"]);
        assert!(matches!(
            cli.cmd,
            Command::Client(ClientCommand::Tasks(TaskCommand::Update { clear_due: true, due: None, .. }))
        ));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result = Cli::try_parse_from(["flowsphere", "tasks", "list", "--status", "someday"]);
        assert!(result.is_err());
    }

    #[test]
    fn time_blocks_need_tasks() {
        assert!(Cli::try_parse_from(["flowsphere", "time-blocks"]).is_err());
        let cli = Cli::parse_from(["flowsphere", "time-blocks", "draft", "review"]);
        match cli.cmd {
            Command::Client(ClientCommand::TimeBlocks { tasks }) => assert_eq!(tasks, vec!["draft", "review"]),
            other => panic!("expected time-blocks, got {other:?}"),
        }
    }

    #[test]
    fn check_config_is_not_a_client_command() {
        let cli = Cli::parse_from(["flowsphere", "check-config"]);
        assert!(matches!(cli.cmd, Command::CheckConfig));
        let cli = Cli::parse_from(["flowsphere", "whoami"]);
        assert!(matches!(cli.cmd, Command::Client(ClientCommand::Whoami)));
    }
}
