use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use aw_safe_outputs::BatchCollector;
use aw_safe_outputs::DEFAULT_OUTPUT_PATH;
use aw_safe_outputs::DEFAULT_REDACTED_LOG_PATH;
use aw_safe_outputs::SafeOutputsConfig;
use aw_safe_outputs::SanitizePolicy;
use clap::Parser;
use owo_colors::OwoColorize;
use tracing::info;

#[derive(Debug, Parser)]
pub struct CollectArgs {
    /// Agent output stream, one JSON record per line. Without one the batch
    /// is empty.
    #[arg(long = "input", short = 'i', env = "GH_AW_SAFE_OUTPUTS")]
    pub input: Option<PathBuf>,

    /// Safe outputs configuration file, YAML or JSON. Takes precedence over
    /// `--config-json`.
    #[arg(long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Inline safe outputs configuration as JSON.
    #[arg(long = "config-json", env = "GH_AW_SAFE_OUTPUTS_CONFIG")]
    pub config_json: Option<String>,

    /// Where the batch artifact is written.
    #[arg(long = "output", short = 'o', default_value = DEFAULT_OUTPUT_PATH)]
    pub output: PathBuf,

    /// Where redacted domains are logged, when there are any.
    #[arg(long = "redacted-log", default_value = DEFAULT_REDACTED_LOG_PATH)]
    pub redacted_log: PathBuf,

    /// Extra domain that URLs may point to. Repeatable.
    #[arg(
        long = "allowed-domain",
        value_name = "DOMAIN",
        env = "GH_AW_ALLOWED_DOMAINS",
        value_delimiter = ','
    )]
    pub allowed_domains: Vec<String>,

    /// Command trigger name to neutralize at the start of text.
    #[arg(long = "command", env = "GH_AW_COMMAND")]
    pub command: Option<String>,

    #[arg(long = "server-url", env = "GITHUB_SERVER_URL", hide = true)]
    pub server_url: Option<String>,

    #[arg(long = "api-url", env = "GITHUB_API_URL", hide = true)]
    pub api_url: Option<String>,
}

impl CollectArgs {
    fn load_config(&self) -> Result<SafeOutputsConfig> {
        if let Some(path) = &self.config {
            return SafeOutputsConfig::load(path)
                .with_context(|| format!("loading {}", path.display()));
        }
        match &self.config_json {
            Some(json) => SafeOutputsConfig::from_yaml_str(json)
                .context("parsing GH_AW_SAFE_OUTPUTS_CONFIG"),
            None => Ok(SafeOutputsConfig::default()),
        }
    }

    fn policy(&self, config: &SafeOutputsConfig) -> SanitizePolicy {
        let platform_urls = self.server_url.iter().chain(&self.api_url);
        let mut policy = config
            .sanitize_policy()
            .with_platform_urls(platform_urls.map(String::as_str));
        policy.extend_domains(&self.allowed_domains);
        match &self.command {
            Some(command) => policy.with_command(command.clone()),
            None => policy,
        }
    }
}

pub fn run(args: CollectArgs) -> Result<()> {
    let config = args.load_config()?;
    let collector = BatchCollector::new(&config, args.policy(&config));
    let batch = match &args.input {
        Some(path) => collector.collect_file(path)?,
        None => {
            info!("no safe outputs stream configured, nothing to collect");
            collector.collect("")
        }
    };

    batch.write_artifact(&args.output)?;
    if batch.redacted_domains().write_to(&args.redacted_log)? {
        eprintln!(
            "{} {} redacted domain(s) logged to {}",
            "note:".cyan(),
            batch.redacted_domains().len(),
            args.redacted_log.display()
        );
    }

    for error in batch.errors() {
        eprintln!("{} {error}", "warning:".yellow());
    }
    println!("{}", batch.to_json()?);

    batch.check()?;
    if !batch.items().is_empty() {
        eprintln!(
            "collected {} item(s): {}",
            batch.items().len(),
            batch.output_types().trim_matches(',').green()
        );
    }
    Ok(())
}
