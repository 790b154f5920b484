//! taskrank command-line front end.
//!
//! # Responsibility
//! - Resolve configuration from file, environment and flags.
//! - Open the database and route each subcommand through `TaskService`.
//!
//! # Invariants
//! - Every rank change goes through the core service; the CLI never writes
//!   rows itself.
//! - Failures are reported on stderr with a non-zero exit code.

mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use taskrank_core::db::open_db_with;
use taskrank_core::{
    init_logging, InsertOutcome, NewTask, SqliteRankStore, Task, TaskId, TaskPatch, TaskService,
    TaskrankConfig,
};

/// Personal task list ordered by explicit priority rank.
#[derive(Parser, Debug)]
#[command(name = "taskrank")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "TASKRANK_DB")]
    db: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, env = "TASKRANK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true, env = "TASKRANK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory for rolling log files (stderr when unset)
    #[arg(long, global = true, env = "TASKRANK_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a task at an explicit rank (end of the list by default)
    Add {
        title: String,

        /// Create as a subtask of this task
        #[arg(long)]
        parent: Option<TaskId>,

        /// Zero-based rank, 0 is the highest priority
        #[arg(long)]
        rank: Option<i64>,

        #[arg(long)]
        description: Option<String>,

        /// Deadline as Unix epoch milliseconds
        #[arg(long)]
        deadline: Option<i64>,
    },

    /// List tasks in priority order
    List {
        #[arg(long)]
        parent: Option<TaskId>,

        /// Include completed tasks
        #[arg(long)]
        all: bool,
    },

    /// Show one task
    Show { id: TaskId },

    /// Change title, description or deadline
    Edit {
        id: TaskId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,

        #[arg(long)]
        clear_description: bool,

        #[arg(long, conflicts_with = "clear_deadline")]
        deadline: Option<i64>,

        #[arg(long)]
        clear_deadline: bool,
    },

    /// Move an active task to a new rank within its list
    Move { id: TaskId, rank: i64 },

    /// Mark a task completed
    Done { id: TaskId },

    /// Bring a completed task back into the active list
    Reopen {
        id: TaskId,

        /// Rank to reopen at (end of the list by default)
        #[arg(long)]
        rank: Option<i64>,
    },

    /// Delete a task and its subtasks
    Rm { id: TaskId },

    /// Rewrite a list's ranks to 0..n-1
    Compact {
        #[arg(long)]
        parent: Option<TaskId>,
    },

    /// Add a task by answering pairwise comparisons
    Prioritize {
        title: String,

        #[arg(long)]
        parent: Option<TaskId>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        deadline: Option<i64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    init_logging(&config.log_level, config.log_dir.as_deref())
        .context("failed to initialize logging")?;

    let conn = open_db_with(&config.db_path, &config.db_options())
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    let store = SqliteRankStore::try_new(&conn)?.with_max_attempts(config.max_tx_attempts);
    let service = TaskService::new(store);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Add {
            title,
            parent,
            rank,
            description,
            deadline,
        } => {
            let draft = NewTask {
                title,
                description,
                deadline,
                group_key: parent,
            };
            let outcome = service.create_task(draft, rank)?;
            print_outcome(&mut out, "added", &outcome)?;
        }
        Commands::List { parent, all } => {
            let tasks = if all {
                service.list_all(parent)?
            } else {
                service.list_active(parent)?
            };
            if tasks.is_empty() {
                writeln!(out, "no tasks")?;
            }
            for task in &tasks {
                print_row(&mut out, task)?;
            }
        }
        Commands::Show { id } => {
            let task = service.get_task(id)?;
            print_details(&mut out, &task)?;
        }
        Commands::Edit {
            id,
            title,
            description,
            clear_description,
            deadline,
            clear_deadline,
        } => {
            let patch = TaskPatch {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                deadline: if clear_deadline {
                    Some(None)
                } else {
                    deadline.map(Some)
                },
            };
            let task = service.update_details(id, &patch)?;
            print_details(&mut out, &task)?;
        }
        Commands::Move { id, rank } => {
            let shifted = service.move_task(id, rank)?;
            writeln!(out, "moved {id} to rank {rank} ({shifted} shifted)")?;
        }
        Commands::Done { id } => {
            if service.complete_task(id)? {
                writeln!(out, "completed {id}")?;
            } else {
                writeln!(out, "{id} was already completed")?;
            }
        }
        Commands::Reopen { id, rank } => {
            let outcome = service.reopen_task(id, rank)?;
            print_outcome(&mut out, "reopened", &outcome)?;
        }
        Commands::Rm { id } => {
            if service.delete_task(id)? {
                writeln!(out, "deleted {id}")?;
            } else {
                writeln!(out, "no task {id}")?;
            }
        }
        Commands::Compact { parent } => {
            let changed = service.compact_group(parent)?;
            writeln!(out, "compacted list ({changed} rank(s) rewritten)")?;
        }
        Commands::Prioritize {
            title,
            parent,
            description,
            deadline,
        } => {
            let draft = NewTask {
                title,
                description,
                deadline,
                group_key: parent,
            };
            let (mut session, first) = service.begin_placement(draft)?;
            let stdin = io::stdin();
            match prompt::run_placement(&mut session, first, stdin.lock(), &mut out)? {
                Some(outcome) => print_outcome(&mut out, "added", &outcome)?,
                None => writeln!(out, "cancelled, nothing added")?,
            }
        }
    }
    Ok(())
}

/// File values first, then flags and environment. Paths come back absolute.
fn resolve_config(cli: &Cli) -> Result<TaskrankConfig> {
    let mut config =
        TaskrankConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    config.validate()?;

    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    config.db_path = absolutize(&cwd, &config.db_path);
    config.log_dir = config.log_dir.map(|dir| absolutize(&cwd, &dir));
    Ok(config)
}

/// Relative paths are taken from the working directory.
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn print_outcome(out: &mut impl Write, verb: &str, outcome: &InsertOutcome) -> Result<()> {
    writeln!(
        out,
        "{verb} {} at rank {} ({} shifted)",
        outcome.task.id, outcome.task.rank, outcome.shifted_count
    )?;
    Ok(())
}

fn print_row(out: &mut impl Write, task: &Task) -> Result<()> {
    let mark = if task.completed { "x" } else { " " };
    writeln!(out, "[{mark}] {:>3}  {}  {}", task.rank, task.id, task.title)?;
    Ok(())
}

fn print_details(out: &mut impl Write, task: &Task) -> Result<()> {
    writeln!(out, "id:          {}", task.id)?;
    writeln!(out, "title:       {}", task.title)?;
    if let Some(description) = &task.description {
        writeln!(out, "description: {description}")?;
    }
    if let Some(deadline) = task.deadline {
        writeln!(out, "deadline:    {deadline}")?;
    }
    if let Some(parent) = task.group_key {
        writeln!(out, "parent:      {parent}")?;
    }
    writeln!(out, "rank:        {}", task.rank)?;
    writeln!(
        out,
        "status:      {}",
        if task.completed { "completed" } else { "active" }
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{absolutize, resolve_config, Cli, Commands};
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("taskrank.json");
        std::fs::write(
            &config_path,
            r#"{ "db_path": "from-file.db", "log_level": "warn", "max_tx_attempts": 5 }"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "taskrank",
            "--config",
            config_path.to_str().unwrap(),
            "--db",
            "from-flag.db",
            "list",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.db_path, cwd.join("from-flag.db"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.max_tx_attempts, 5);
    }

    #[test]
    fn relative_log_dir_resolves_against_working_directory() {
        let cli = Cli::try_parse_from(["taskrank", "--log-dir", "logs", "list"]).unwrap();
        let config = resolve_config(&cli).unwrap();

        let log_dir = config.log_dir.unwrap();
        assert!(log_dir.is_absolute());
        assert_eq!(log_dir, std::env::current_dir().unwrap().join("logs"));
        assert!(config.db_path.is_absolute());
    }

    #[test]
    fn absolutize_keeps_absolute_paths() {
        let base = PathBuf::from("/work");
        let absolute = std::env::temp_dir().join("taskrank.db");

        assert_eq!(absolutize(&base, &absolute), absolute);
        assert_eq!(
            absolutize(&base, &PathBuf::from("data/taskrank.db")),
            base.join("data/taskrank.db")
        );
    }

    #[test]
    fn invalid_log_level_flag_is_rejected() {
        let cli = Cli::try_parse_from(["taskrank", "--log-level", "loud", "list"]).unwrap();
        assert!(resolve_config(&cli).is_err());
    }

    #[test]
    fn edit_rejects_conflicting_description_flags() {
        let id = uuid::Uuid::new_v4().to_string();
        let parsed = Cli::try_parse_from([
            "taskrank",
            "edit",
            id.as_str(),
            "--description",
            "text",
            "--clear-description",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["taskrank", "edit", id.as_str(), "--clear-deadline"])
            .unwrap();
        assert!(matches!(
            parsed.command,
            Commands::Edit {
                clear_deadline: true,
                ..
            }
        ));
    }
}
