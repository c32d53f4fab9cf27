//! alembic - formula-driven source installer CLI

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "alembic")]
#[command(author, version, about = "alembic - install tools from formulas")]
pub struct Cli {
    /// Show what would happen without making changes
    #[arg(long, global = true)]
    dry_run: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory holding formula definitions
    #[arg(long, global = true, env = "ALEMBIC_FORMULA_DIR")]
    formula_dir: Option<PathBuf>,

    /// Concurrency limit for parallel installs
    #[arg(long, global = true, env = "ALEMBIC_JOBS")]
    jobs: Option<usize>,

    /// Per-attempt fetch timeout in seconds
    #[arg(long, global = true, env = "ALEMBIC_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// Smoke-test timeout in seconds
    #[arg(long, global = true, env = "ALEMBIC_TEST_TIMEOUT", default_value_t = 30)]
    test_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install one or more formulas
    Install {
        /// Formula name(s), optionally pinned (name@version), or paths to
        /// formula files
        #[arg(required = true)]
        formulas: Vec<String>,
    },
    /// Run a formula's smoke test against its installed prefix
    Test {
        /// Formula name or path to a formula file
        formula: String,
    },
    /// Validate a formula file without installing anything
    Check {
        /// Formula file to check
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Cancellation propagates to in-flight pipelines at step boundaries;
    // running subprocesses are killed.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let result = match &cli.command {
        Commands::Install { formulas } => cmd::install::install(&cli, formulas, cancel).await,
        Commands::Test { formula } => cmd::test::test(&cli, formula).await,
        Commands::Check { path } => cmd::check::check(path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("alembic: {e}");
            ExitCode::FAILURE
        }
    }
}

impl Cli {
    fn formula_dir(&self) -> PathBuf {
        if let Some(dir) = &self.formula_dir {
            return dir.clone();
        }
        let default = alembic::default_formula_dir();
        if !default.exists() {
            // A formulas/ directory next to the invocation works out of the
            // box for checkouts that ship their own definitions.
            let local = PathBuf::from("formulas");
            if local.is_dir() {
                return local;
            }
        }
        default
    }

    fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get).max(1)
    }
}
