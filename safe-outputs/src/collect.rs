use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::SafeOutputsConfig;
use crate::error::CollectError;
use crate::error::SafeOutputsError;
use crate::error::SafeOutputsResult;
use crate::quota::Quota;
use crate::quota::QuotaEnforcer;
use crate::registry;
use crate::registry::TypeSpec;
use crate::repair::parse_line;
use crate::sanitize::RedactedDomainLog;
use crate::sanitize::SanitizePolicy;
use crate::sanitize::Sanitizer;
use crate::telemetry;
use crate::validate::SafeOutputItem;
use crate::validate::validate;

/// Where the batch is written for the dispatch jobs.
pub const DEFAULT_OUTPUT_PATH: &str = "/tmp/gh-aw/safeoutputs/agent_output.json";
pub const DEFAULT_REDACTED_LOG_PATH: &str = "/tmp/gh-aw/redacted-urls.log";

/// Result of one collection pass. Serializes as `{"items": [...], "errors": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batch {
    items: Vec<SafeOutputItem>,
    errors: Vec<String>,
    #[serde(skip)]
    counts: BTreeMap<String, usize>,
    #[serde(skip)]
    redacted_domains: RedactedDomainLog,
}

impl Batch {
    pub fn items(&self) -> &[SafeOutputItem] {
        &self.items
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Accepted items per type.
    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn redacted_domains(&self) -> &RedactedDomainLog {
        &self.redacted_domains
    }

    pub fn items_of<'a>(
        &'a self,
        output_type: &'a str,
    ) -> impl Iterator<Item = &'a SafeOutputItem> {
        self.items
            .iter()
            .filter(move |item| item.type_name() == output_type)
    }

    /// Sorted names of the types with at least one item, each wrapped in
    /// commas (`,add_comment,create_issue,`), or empty. Dispatch job
    /// conditions test for `,<type>,` so no type name matches inside a
    /// longer one.
    pub fn output_types(&self) -> String {
        let names: Vec<&str> = self
            .counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, _)| name.as_str())
            .collect();
        if names.is_empty() {
            return String::new();
        }
        format!(",{},", names.join(","))
    }

    /// Fails when issues were recorded but nothing usable came out.
    pub fn check(&self) -> Result<(), CollectError> {
        if self.items.is_empty() && !self.errors.is_empty() {
            return Err(CollectError {
                messages: self.errors.clone(),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> SafeOutputsResult<String> {
        serde_json::to_string(self).map_err(|err| SafeOutputsError::serialize("batch", err))
    }

    pub fn write_artifact(&self, path: &Path) -> SafeOutputsResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| SafeOutputsError::io(parent, err))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| SafeOutputsError::serialize("batch", err))?;
        fs::write(path, json).map_err(|err| SafeOutputsError::io(path, err))
    }
}

/// Runs parse, validate and quota admission over a whole output stream.
#[derive(Debug, Clone)]
pub struct BatchCollector {
    enabled: BTreeMap<&'static str, &'static TypeSpec>,
    quotas: BTreeMap<String, Quota>,
    sanitizer: Sanitizer,
}

impl BatchCollector {
    pub fn new(config: &SafeOutputsConfig, policy: SanitizePolicy) -> Self {
        Self {
            enabled: config
                .enabled()
                .map(|(spec, _)| (spec.name, spec))
                .collect(),
            quotas: config.quotas(),
            sanitizer: Sanitizer::new(policy),
        }
    }

    /// Collects with the sanitizer policy derived from `config` alone.
    pub fn from_config(config: &SafeOutputsConfig) -> Self {
        Self::new(config, config.sanitize_policy())
    }

    /// Processes one record per non-empty line. Every call starts with fresh
    /// quota counters.
    pub fn collect(&self, input: &str) -> Batch {
        let started = Instant::now();
        let mut quotas = QuotaEnforcer::new(self.quotas.clone());
        let mut redacted = RedactedDomainLog::new();
        let mut items = Vec::new();
        let mut errors = Vec::new();
        let mut lines = 0;

        for (idx, raw_line) in input.split('\n').enumerate() {
            let line_no = idx + 1;
            let text = raw_line.trim();
            if text.is_empty() {
                continue;
            }
            lines += 1;

            let record = match parse_line(line_no, text) {
                Ok(record) => record,
                Err(err) => {
                    warn!(line = line_no, "{err}");
                    errors.push(err.to_string());
                    continue;
                }
            };

            let Some(type_name) = record.get("type").and_then(|value| value.as_str()) else {
                errors.push(format!("Line {line_no}: missing required 'type' field"));
                continue;
            };
            let canonical = registry::canonical_type_name(type_name);
            let Some(spec) = self.enabled.get(canonical.as_str()).copied() else {
                let message = format!(
                    "Line {line_no}: unexpected output type '{canonical}' (enabled: {})",
                    self.enabled_list()
                );
                warn!("{message}");
                errors.push(message);
                continue;
            };

            let item = match validate(record, spec, &self.sanitizer, &mut redacted) {
                Ok(item) => item,
                Err(issues) => {
                    for issue in issues {
                        let message = format!("Line {line_no}: {issue}");
                        warn!("{message}");
                        errors.push(message);
                    }
                    continue;
                }
            };

            match quotas.admit(spec.name) {
                Ok(()) => {
                    debug!(line = line_no, output_type = spec.name, "accepted safe output");
                    items.push(item);
                }
                Err(exceeded) => {
                    let message = format!("Line {line_no}: {exceeded}");
                    warn!("{message}");
                    errors.push(message);
                }
            }
        }

        let batch = Batch {
            items,
            errors,
            counts: quotas.into_counts(),
            redacted_domains: redacted,
        };
        info!(
            items = batch.items.len(),
            errors = batch.errors.len(),
            "collected safe outputs"
        );
        telemetry::record_collection(&batch, lines, started.elapsed());
        batch
    }

    /// Reads and collects `path`. A missing file yields an empty batch.
    pub fn collect_file(&self, path: &Path) -> SafeOutputsResult<Batch> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(self.collect(&contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no safe outputs file, nothing to collect");
                Ok(Batch::default())
            }
            Err(err) => Err(SafeOutputsError::io(path, err)),
        }
    }

    fn enabled_list(&self) -> String {
        if self.enabled.is_empty() {
            return "none".to_string();
        }
        self.enabled.keys().copied().collect::<Vec<_>>().join(", ")
    }
}
