//! Workflow-level and per-type safe output configuration.
//!
//! Documents are read with `serde_yaml`, which also accepts JSON, so the same
//! loader serves workflow files and the inline `GH_AW_SAFE_OUTPUTS_CONFIG`
//! value handed to the collector.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_yaml::Value as YamlValue;

use crate::error::ConfigError;
use crate::error::SafeOutputsError;
use crate::error::SafeOutputsResult;
use crate::quota::Quota;
use crate::registry;
use crate::registry::TypeSpec;
use crate::sanitize::SanitizePolicy;

static TOKEN_EXPRESSION_RE: Lazy<Regex> = Lazy::new(|| {
    let term = r"(?:secrets\.[A-Za-z_][A-Za-z0-9_]*|github\.token)";
    Regex::new(&format!(r"^\$\{{\{{\s*{term}(?:\s*\|\|\s*{term})*\s*\}}\}}$"))
        .expect("compiled token expression regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IfNoChanges {
    #[default]
    Warn,
    Error,
    Ignore,
}

impl IfNoChanges {
    pub fn as_str(self) -> &'static str {
        match self {
            IfNoChanges::Warn => "warn",
            IfNoChanges::Error => "error",
            IfNoChanges::Ignore => "ignore",
        }
    }
}

/// Options accepted under one type key. Fields a type does not use are
/// ignored for that type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TypeConfig {
    pub max: Option<usize>,
    pub min: Option<usize>,
    pub github_token: Option<String>,
    pub target: Option<String>,
    pub target_repo: Option<String>,
    pub title_prefix: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub allowed_labels: Vec<String>,
    pub draft: Option<bool>,
    pub if_no_changes: Option<IfNoChanges>,
    pub allow_empty: Option<bool>,
    /// Kilobytes.
    pub max_patch_size: Option<u32>,
    /// Days until the created item is closed automatically.
    pub expires: Option<u32>,
    pub category: Option<String>,
    pub side: Option<String>,
    pub hide_older_comments: Option<bool>,
    #[serde(default)]
    pub required_labels: Vec<String>,
    pub required_title_prefix: Option<String>,
}

impl TypeConfig {
    pub fn quota(&self) -> Quota {
        match self.max {
            Some(max) => Quota::Max(max),
            None => Quota::Unbounded,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeOutputsConfig {
    pub github_token: Option<String>,
    pub staged: bool,
    pub target_repo: Option<String>,
    pub allowed_domains: Vec<String>,
    pub messages: IndexMap<String, String>,
    pub env: IndexMap<String, String>,
    pub threat_detection: bool,
    pub max_lines: Option<usize>,
    pub max_bytes: Option<usize>,
    outputs: BTreeMap<&'static str, TypeConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSafeOutputs {
    github_token: Option<String>,
    #[serde(default)]
    staged: bool,
    target_repo: Option<String>,
    #[serde(default)]
    allowed_domains: Vec<String>,
    #[serde(default)]
    messages: IndexMap<String, String>,
    #[serde(default)]
    env: IndexMap<String, String>,
    #[serde(default)]
    threat_detection: bool,
    max_lines: Option<usize>,
    max_bytes: Option<usize>,
    #[serde(flatten)]
    outputs: IndexMap<String, YamlValue>,
}

impl SafeOutputsConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawSafeOutputs =
            serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::try_from(raw)
    }

    pub fn load(path: &Path) -> SafeOutputsResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| SafeOutputsError::io(path, err))?;
        Ok(Self::from_yaml_str(&contents)?)
    }

    /// Enables `output_type` with `config`, replacing earlier settings.
    pub fn enable(&mut self, output_type: &str, config: TypeConfig) -> Result<(), ConfigError> {
        let spec = registry::lookup(output_type)
            .ok_or_else(|| ConfigError::UnknownOutputType(output_type.to_string()))?;
        validate_type_config(spec, &config)?;
        self.outputs.insert(spec.name, config);
        Ok(())
    }

    pub fn is_enabled(&self, output_type: &str) -> bool {
        let canonical = registry::canonical_type_name(output_type);
        self.outputs.contains_key(canonical.as_str())
    }

    pub fn type_config(&self, output_type: &str) -> Option<&TypeConfig> {
        let canonical = registry::canonical_type_name(output_type);
        self.outputs.get(canonical.as_str())
    }

    /// Enabled types in registry order.
    pub fn enabled(&self) -> impl Iterator<Item = (&'static TypeSpec, &TypeConfig)> {
        registry::builtin_types()
            .iter()
            .filter_map(|spec| self.outputs.get(spec.name).map(|config| (spec, config)))
    }

    pub fn enabled_type_names(&self) -> Vec<&'static str> {
        self.enabled().map(|(spec, _)| spec.name).collect()
    }

    /// Effective quota per enabled type, hard caps applied.
    pub fn quotas(&self) -> BTreeMap<String, Quota> {
        self.enabled()
            .map(|(spec, config)| (spec.name.to_string(), config.quota().capped(spec.max_cap)))
            .collect()
    }

    pub fn sanitize_policy(&self) -> SanitizePolicy {
        let mut policy = SanitizePolicy::default();
        policy.extend_domains(&self.allowed_domains);
        let max_lines = self.max_lines.unwrap_or(policy.max_lines());
        let max_bytes = self.max_bytes.unwrap_or(policy.max_bytes());
        policy.with_limits(max_lines, max_bytes)
    }

    /// Custom message templates as the JSON object dispatch steps read,
    /// with kebab-case keys turned into camelCase.
    pub fn messages_json(&self) -> Option<String> {
        if self.messages.is_empty() {
            return None;
        }
        let messages: IndexMap<String, &String> = self
            .messages
            .iter()
            .map(|(key, value)| (camel_case(key), value))
            .collect();
        serde_json::to_string(&messages).ok()
    }
}

impl TryFrom<RawSafeOutputs> for SafeOutputsConfig {
    type Error = ConfigError;

    fn try_from(raw: RawSafeOutputs) -> Result<Self, Self::Error> {
        if let Some(token) = &raw.github_token {
            validate_token(token, "safe-outputs")?;
        }
        if raw.target_repo.as_deref() == Some("*") {
            return Err(ConfigError::WildcardTargetRepo("safe-outputs".to_string()));
        }

        let mut outputs = BTreeMap::new();
        for (key, value) in raw.outputs {
            let spec = registry::lookup(&key)
                .ok_or_else(|| ConfigError::UnknownOutputType(key.clone()))?;
            let config = match value {
                YamlValue::Null | YamlValue::Bool(true) => TypeConfig::default(),
                YamlValue::Bool(false) => continue,
                YamlValue::Mapping(_) => serde_yaml::from_value::<TypeConfig>(value)
                    .map_err(|err| ConfigError::invalid(spec.config_key(), err.to_string()))?,
                _ => {
                    return Err(ConfigError::invalid(
                        spec.config_key(),
                        "expected true, false, null or a mapping",
                    ));
                }
            };
            validate_type_config(spec, &config)?;
            if outputs.insert(spec.name, config).is_some() {
                return Err(ConfigError::invalid(
                    spec.config_key(),
                    "configured more than once",
                ));
            }
        }

        Ok(Self {
            github_token: raw.github_token,
            staged: raw.staged,
            target_repo: raw.target_repo,
            allowed_domains: raw.allowed_domains,
            messages: raw.messages,
            env: raw.env,
            threat_detection: raw.threat_detection,
            max_lines: raw.max_lines,
            max_bytes: raw.max_bytes,
            outputs,
        })
    }
}

fn validate_type_config(spec: &TypeSpec, config: &TypeConfig) -> Result<(), ConfigError> {
    if config.max == Some(0) {
        return Err(ConfigError::ZeroMax(spec.config_key()));
    }
    if config.target_repo.as_deref() == Some("*") {
        return Err(ConfigError::WildcardTargetRepo(spec.config_key()));
    }
    if let Some(token) = &config.github_token {
        validate_token(token, &spec.config_key())?;
    }
    if let (Some(min), Some(max)) = (config.min, config.max)
        && min > max
    {
        return Err(ConfigError::invalid(
            spec.config_key(),
            format!("'min' ({min}) exceeds 'max' ({max})"),
        ));
    }
    Ok(())
}

/// Tokens must be expressions resolved by the platform, never literals.
pub fn validate_token(token: &str, scope: &str) -> Result<(), ConfigError> {
    if TOKEN_EXPRESSION_RE.is_match(token.trim()) {
        Ok(())
    } else {
        Err(ConfigError::PlaintextToken {
            scope: scope.to_string(),
        })
    }
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '-' || c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub id: String,
    pub version: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEngine {
    Id(String),
    Detailed {
        id: String,
        version: Option<String>,
        model: Option<String>,
    },
}

impl From<RawEngine> for EngineConfig {
    fn from(raw: RawEngine) -> Self {
        match raw {
            RawEngine::Id(id) => Self {
                id,
                version: None,
                model: None,
            },
            RawEngine::Detailed { id, version, model } => Self { id, version, model },
        }
    }
}

/// Everything the job spec builder reads from a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub name: Option<String>,
    pub workflow_id: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub tracker_id: Option<String>,
    pub github_token: Option<String>,
    pub engine: Option<EngineConfig>,
    pub command: Option<String>,
    pub safe_outputs: SafeOutputsConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawWorkflow {
    name: Option<String>,
    workflow_id: Option<String>,
    source: Option<String>,
    source_url: Option<String>,
    tracker_id: Option<String>,
    github_token: Option<String>,
    engine: Option<RawEngine>,
    command: Option<String>,
    safe_outputs: Option<RawSafeOutputs>,
}

impl WorkflowConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawWorkflow =
            serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))?;
        if let Some(token) = &raw.github_token {
            validate_token(token, "the workflow")?;
        }
        let safe_outputs = match raw.safe_outputs {
            Some(raw) => SafeOutputsConfig::try_from(raw)?,
            None => SafeOutputsConfig::default(),
        };
        Ok(Self {
            name: raw.name,
            workflow_id: raw.workflow_id,
            source: raw.source,
            source_url: raw.source_url,
            tracker_id: raw.tracker_id,
            github_token: raw.github_token,
            engine: raw.engine.map(EngineConfig::from),
            command: raw.command,
            safe_outputs,
        })
    }

    pub fn load(path: &Path) -> SafeOutputsResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| SafeOutputsError::io(path, err))?;
        Ok(Self::from_yaml_str(&contents)?)
    }

    pub fn engine_id(&self) -> Option<&str> {
        self.engine.as_ref().map(|engine| engine.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn booleans_nulls_and_mappings_enable_types() {
        let config = SafeOutputsConfig::from_yaml_str(
            "create-issue:\nadd_comment: true\nadd-labels: false\ncreate-discussion:\n  max: 3\n",
        )
        .unwrap();
        assert_eq!(
            config.enabled_type_names(),
            vec!["create_issue", "create_discussion", "add_comment"]
        );
        assert_eq!(
            config.quotas(),
            BTreeMap::from([
                ("add_comment".to_string(), Quota::Unbounded),
                ("create_discussion".to_string(), Quota::Max(3)),
                ("create_issue".to_string(), Quota::Unbounded),
            ])
        );
    }

    #[test]
    fn json_documents_are_accepted() {
        let config = SafeOutputsConfig::from_yaml_str(r#"{"create-issue":{"max":2}}"#).unwrap();
        assert_eq!(config.quotas().get("create_issue"), Some(&Quota::Max(2)));
    }

    #[test]
    fn pull_request_types_are_capped() {
        let config = SafeOutputsConfig::from_yaml_str("create-pull-request:\n  max: 5\n").unwrap();
        assert_eq!(config.quotas().get("create_pull_request"), Some(&Quota::Max(1)));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert_eq!(
            SafeOutputsConfig::from_yaml_str("launch-missiles: true"),
            Err(ConfigError::UnknownOutputType("launch-missiles".to_string()))
        );
        assert_eq!(
            SafeOutputsConfig::from_yaml_str("create-issue:\n  max: 0\n"),
            Err(ConfigError::ZeroMax("create-issue".to_string()))
        );
        assert_eq!(
            SafeOutputsConfig::from_yaml_str("add-comment:\n  target-repo: \"*\"\n"),
            Err(ConfigError::WildcardTargetRepo("add-comment".to_string()))
        );
        assert_eq!(
            SafeOutputsConfig::from_yaml_str("create-issue:\n  github-token: ghp_abc123\n"),
            Err(ConfigError::PlaintextToken {
                scope: "create-issue".to_string()
            })
        );
        assert!(matches!(
            SafeOutputsConfig::from_yaml_str("create-issue:\n  maximum: 3\n"),
            Err(ConfigError::InvalidTypeConfig { .. })
        ));
        assert!(matches!(
            SafeOutputsConfig::from_yaml_str("create-issue: 3"),
            Err(ConfigError::InvalidTypeConfig { .. })
        ));
    }

    #[test]
    fn token_expressions_are_validated() {
        for ok in [
            "${{ secrets.GITHUB_TOKEN }}",
            "${{  secrets.MY_TOKEN  }}",
            "${{ secrets._PRIVATE_TOKEN }}",
            "${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}",
            "${{ github.token }}",
        ] {
            assert_eq!(validate_token(ok, "test"), Ok(()), "{ok}");
        }
        for bad in ["", "ghp_1234567890", "my-secret-token", "${{ env.TOKEN }}"] {
            assert!(validate_token(bad, "test").is_err(), "{bad}");
        }
    }

    #[test]
    fn workflow_config_reads_engine_and_globals() {
        let workflow = WorkflowConfig::from_yaml_str(
            r#"
name: Triage
github-token: ${{ secrets.WORKFLOW_PAT }}
engine:
  id: copilot
  model: gpt-5
safe-outputs:
  staged: true
  github-token: ${{ secrets.SAFE_OUTPUTS_PAT }}
  messages:
    run-started: "Working on it"
  create-issue:
    title-prefix: "[bot] "
"#,
        )
        .unwrap();
        assert_eq!(workflow.name.as_deref(), Some("Triage"));
        assert_eq!(workflow.engine_id(), Some("copilot"));
        assert!(workflow.safe_outputs.staged);
        assert_eq!(
            workflow.safe_outputs.messages_json().as_deref(),
            Some(r#"{"runStarted":"Working on it"}"#)
        );
        assert_eq!(
            workflow
                .safe_outputs
                .type_config("create-issue")
                .and_then(|config| config.title_prefix.as_deref()),
            Some("[bot] ")
        );
    }

    #[test]
    fn engine_may_be_a_bare_id() {
        let workflow = WorkflowConfig::from_yaml_str("name: x\nengine: claude\n").unwrap();
        assert_eq!(workflow.engine_id(), Some("claude"));
    }
}
