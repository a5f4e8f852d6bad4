use std::fmt::Write as _;

use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use aw_safe_outputs::manifest;
use clap::Parser;
use owo_colors::OwoColorize;

#[derive(Debug, Parser)]
pub struct EnvArgs {
    /// Dispatch job type, dash or underscore form.
    pub job_type: String,

    /// Check the current environment for missing required variables.
    #[arg(long = "check")]
    pub check: bool,

    /// Print the manifest rows as JSON.
    #[arg(long = "json")]
    pub json: bool,
}

pub fn run(args: EnvArgs) -> Result<()> {
    let EnvArgs {
        job_type,
        check,
        json,
    } = args;

    let vars = manifest::all_env_vars(&job_type).map_err(|err| {
        anyhow!(
            "{err}; supported job types: {}",
            manifest::supported_job_types().join(", ")
        )
    })?;

    if check {
        let bound: Vec<String> = std::env::vars()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, _)| name)
            .collect();
        let missing =
            manifest::missing_required_env_vars(&job_type, bound.iter().map(String::as_str));
        if !missing.is_empty() {
            for name in &missing {
                eprintln!("  {} {name}", "missing:".red());
            }
            bail!(
                "{} required environment variable(s) unset for `{job_type}`",
                missing.len()
            );
        }
        println!("all required environment variables for `{job_type}` are set");
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&vars)?);
        return Ok(());
    }

    for entry in vars {
        let mut line = String::new();
        let _ = write!(line, "- {}", entry.name.green());
        if entry.required {
            let _ = write!(line, " {}", "(required)".red());
        }
        let _ = write!(line, ": {}", entry.description);
        if let Some(default) = entry.default {
            let _ = write!(line, " [default: {}]", default.cyan());
        }
        println!("{line}");
    }
    Ok(())
}
