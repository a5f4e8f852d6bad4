use anyhow::Result;
use aw_cli::Cli;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();
    aw_cli::init_tracing(cli.verbose);
    aw_cli::run_cli(cli)
}
