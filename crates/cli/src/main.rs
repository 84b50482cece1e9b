// recon CLI - two-phase dataset reconciliation against the Reconciliation Service

mod exit_codes;
mod job;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use recon_core::{TransportError, ValidationError, WorkflowError};

use exit_codes::{workflow_exit_code, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "recon")]
#[command(about = "Reconcile two datasets through the Reconciliation Service")]
#[command(version)]
struct Cli {
    /// Reconciliation Service base URL (overrides the settings file)
    #[arg(long, global = true, env = "RECON_API_BASE_URL")]
    api_base: Option<String>,

    /// More log output on stderr (-v info, -vv debug). RUST_LOG wins if set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest mappings, apply the job's approvals, and reconcile
    #[command(after_help = "\
Examples:
  recon run job.toml
  recon run job.toml --json
  recon run job.toml --output report.json
  recon run job.toml --api-base https://recon.example.com/api")]
    Run {
        /// Path to the job TOML file
        job: PathBuf,

        /// Output the JSON report to stdout instead of only the summary
        #[arg(long)]
        json: bool,

        /// Write the JSON report to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Phase 1 only: show suggested mappings and unmapped columns
    #[command(after_help = "\
Examples:
  recon suggest job.toml
  recon suggest job.toml --json")]
    Suggest {
        /// Path to the job TOML file
        job: PathBuf,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Check a job file without contacting the service
    Validate {
        /// Path to the job TOML file
        job: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if std::env::var("RUST_LOG").is_err() {
        let level = match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        };
        builder.filter_level(level);
    }
    let _ = builder.format_timestamp_millis().try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let api_base = cli.api_base.as_deref();
    let result = match cli.command {
        Commands::Run { job, json, output } => recon::cmd_run(job, json, output, api_base),
        Commands::Suggest { job, json } => recon::cmd_suggest(job, json, api_base),
        Commands::Validate { job } => recon::cmd_validate(job),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Create error from a workflow error with proper exit code.
    pub fn from_workflow(err: WorkflowError) -> Self {
        let code = workflow_exit_code(&err);
        let hint = match &err {
            WorkflowError::Transport(TransportError::Network(_)) => {
                Some("is the service reachable? check --api-base or RECON_API_BASE_URL".into())
            }
            WorkflowError::Transport(TransportError::Http { status: 404, .. }) => {
                Some("the base URL should end in the API prefix, e.g. http://host:8080/api".into())
            }
            WorkflowError::Validation(ValidationError::NoApprovedMappings) => {
                Some("accept at least one suggested pair under [approval] in the job file".into())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
