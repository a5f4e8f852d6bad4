use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use aw_safe_outputs::JobSpecBuilder;
use aw_safe_outputs::WorkflowConfig;
use aw_safe_outputs::jobs_to_json;
use aw_safe_outputs::jobs_to_yaml;
use clap::Parser;
use clap::ValueEnum;
use owo_colors::OwoColorize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, Parser)]
pub struct CompileArgs {
    /// Workflow configuration file, YAML or JSON.
    #[arg(long = "config", short = 'c')]
    pub config: PathBuf,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,

    /// Fail when a job lacks a required environment binding.
    #[arg(long = "strict-env")]
    pub strict_env: bool,
}

pub fn run(args: CompileArgs) -> Result<()> {
    let workflow = WorkflowConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let steps = JobSpecBuilder::new()
        .strict_env(args.strict_env)
        .build(&workflow)?;

    match args.format {
        OutputFormat::Yaml => print!("{}", jobs_to_yaml(&steps)?),
        OutputFormat::Json => println!("{}", jobs_to_json(&steps)?),
    }

    let names: Vec<_> = steps.iter().map(|step| step.output_type).collect();
    eprintln!(
        "compiled {} safe output job(s): {}",
        steps.len(),
        names.join(", ").green()
    );
    Ok(())
}
