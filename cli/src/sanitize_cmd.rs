use std::io::Read as _;

use anyhow::Context;
use anyhow::Result;
use aw_safe_outputs::RedactedDomainLog;
use aw_safe_outputs::SanitizePolicy;
use aw_safe_outputs::Sanitizer;
use clap::Parser;
use owo_colors::OwoColorize;

#[derive(Debug, Parser)]
pub struct SanitizeArgs {
    /// Extra domain that URLs may point to. Repeatable.
    #[arg(long = "allowed-domain", value_name = "DOMAIN", value_delimiter = ',')]
    pub allowed_domains: Vec<String>,

    /// Command trigger name to neutralize at the start of text.
    #[arg(long = "command", env = "GH_AW_COMMAND")]
    pub command: Option<String>,

    #[arg(long = "max-lines")]
    pub max_lines: Option<usize>,

    #[arg(long = "max-bytes")]
    pub max_bytes: Option<usize>,
}

impl SanitizeArgs {
    fn policy(&self) -> SanitizePolicy {
        let mut policy = SanitizePolicy::default();
        policy.extend_domains(&self.allowed_domains);
        let max_lines = self.max_lines.unwrap_or(policy.max_lines());
        let max_bytes = self.max_bytes.unwrap_or(policy.max_bytes());
        policy
            .with_limits(max_lines, max_bytes)
            .with_command(self.command.clone())
    }
}

pub fn run(args: SanitizeArgs) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading stdin")?;

    let sanitizer = Sanitizer::new(args.policy());
    let mut redacted = RedactedDomainLog::new();
    println!("{}", sanitizer.sanitize(&input, &mut redacted));

    for domain in redacted.iter() {
        eprintln!("{} {domain}", "redacted:".yellow());
    }
    Ok(())
}
