//! Command surface for the safe outputs pipeline.

mod collect_cmd;
mod compile_cmd;
mod env_cmd;
mod sanitize_cmd;

use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use tracing_subscriber::EnvFilter;

pub use collect_cmd::CollectArgs;
pub use compile_cmd::CompileArgs;
pub use compile_cmd::OutputFormat;
pub use env_cmd::EnvArgs;
pub use sanitize_cmd::SanitizeArgs;

#[derive(Debug, Parser)]
#[command(
    name = "gh-aw-safe-outputs",
    version,
    about = "Collect, sanitize and compile agent safe outputs"
)]
pub struct Cli {
    /// Log at debug level when RUST_LOG is unset.
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate an agent output stream and write the batch artifact.
    Collect(CollectArgs),

    /// Sanitize text read from stdin and print it to stdout.
    Sanitize(SanitizeArgs),

    /// Compile the dispatch jobs of a workflow.
    Compile(CompileArgs),

    /// Show the environment contract of a dispatch job.
    Env(EnvArgs),
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Collect(args) => collect_cmd::run(args),
        Command::Sanitize(args) => sanitize_cmd::run(args),
        Command::Compile(args) => compile_cmd::run(args),
        Command::Env(args) => env_cmd::run(args),
    }
}
