//! Cross-artifact consistency checker CLI.
//!
//! Usage:
//!   crosscheck check ./generated --project shop --batch b1 --apply --db issues.db
//!   crosscheck issues --db issues.db --project shop
//!   crosscheck dismiss --db issues.db --project shop <issue-id>

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use crosscheck_core::loader::{load_artifacts, write_back};
use crosscheck_core::{EngineConfig, IssueStatus, IssueStore, Severity, ValidationEngine};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crosscheck")]
#[command(about = "Detect and fix naming drift across independently generated source files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate every recognised source file under a directory as one batch
    Check {
        /// Directory holding the generated artifacts
        dir: PathBuf,

        #[arg(long, default_value = "default")]
        project: String,

        #[arg(long, default_value = "default")]
        batch: String,

        /// JSON config file (CROSSCHECK_* variables override it)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// SQLite issue store to persist issues and runs in
        #[arg(long)]
        db: Option<PathBuf>,

        /// Write verified fixes back to disk
        #[arg(long)]
        apply: bool,

        /// Extra exclude patterns
        #[arg(long)]
        exclude: Vec<String>,

        /// Exit non-zero when critical issues remain
        #[arg(long)]
        strict: bool,
    },
    /// List persisted issues of a project
    Issues {
        #[arg(long)]
        db: PathBuf,

        #[arg(long, default_value = "default")]
        project: String,

        #[arg(long)]
        batch: Option<String>,
    },
    /// Mark an issue as dismissed
    Dismiss {
        #[arg(long)]
        db: PathBuf,

        #[arg(long, default_value = "default")]
        project: String,

        issue_id: String,
    },
    /// Mark an issue as resolved
    Resolve {
        #[arg(long)]
        db: PathBuf,

        #[arg(long, default_value = "default")]
        project: String,

        issue_id: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn open_store(db: &Path) -> Result<IssueStore, Box<dyn std::error::Error>> {
    let store = IssueStore::new(db)?;
    store.init_schema()?;
    Ok(store)
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Check {
            dir,
            project,
            batch,
            config,
            db,
            apply,
            exclude,
            strict,
        } => {
            let mut config = EngineConfig::load(config.as_deref())?;
            if !apply {
                config.auto_fix = false;
            }
            let mut engine = ValidationEngine::new(config);
            if let Some(db) = &db {
                engine = engine.with_store(open_store(db)?);
            }

            let artifacts = load_artifacts(&dir, &exclude)?;
            eprintln!("Loaded {} artifacts from {}", artifacts.len(), dir.display());
            let outcome = engine.validate_batch(&project, &batch, artifacts.clone());

            if apply {
                let written = write_back(&dir, &artifacts, &outcome.artifacts)?;
                eprintln!("Applied fixes to {} files", written);
            }
            println!("{}", serde_json::to_string_pretty(&outcome.report)?);

            let open_critical = outcome
                .report
                .issues
                .iter()
                .any(|i| i.severity == Severity::Critical && i.status != IssueStatus::AutoFixed);
            Ok(if strict && open_critical { 2 } else { 0 })
        }
        Command::Issues { db, project, batch } => {
            let store = open_store(&db)?;
            let issues = store.load_issues(&project, batch.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&issues)?);
            Ok(0)
        }
        Command::Dismiss { db, project, issue_id } => {
            let issue = open_store(&db)?.set_status(&project, &issue_id, IssueStatus::Dismissed)?;
            eprintln!("Issue {} dismissed", issue.id);
            Ok(0)
        }
        Command::Resolve { db, project, issue_id } => {
            let issue = open_store(&db)?.set_status(&project, &issue_id, IssueStatus::Resolved)?;
            eprintln!("Issue {} resolved", issue.id);
            Ok(0)
        }
    }
}
