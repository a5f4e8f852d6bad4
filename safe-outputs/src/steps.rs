//! Compile-time job spec builder.
//!
//! One [`StepSpecification`] is produced per enabled type. Nothing here runs
//! at dispatch time: configuration mistakes surface as [`ConfigError`] while
//! the workflow is compiled.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;
use tracing::warn;

use crate::condition;
use crate::condition::AGENT_JOB;
use crate::condition::Condition;
use crate::condition::DETECTION_JOB;
use crate::config::IfNoChanges;
use crate::config::TypeConfig;
use crate::config::WorkflowConfig;
use crate::error::ConfigError;
use crate::manifest;
use crate::registry::Access;
use crate::registry::TypeSpec;
use crate::telemetry;
use crate::token;
use crate::token::ResolvedToken;
use crate::token::TokenContext;

pub const CHECKOUT_ACTION: &str = "actions/checkout@v5";
const DEFAULT_MAX_PATCH_SIZE_KB: u32 = 1024;
const GIT_BOT_NAME: &str = "github-actions[bot]";
const GIT_BOT_EMAIL: &str = "github-actions[bot]@users.noreply.github.com";

/// Jobs whose identifiers `add_comment` links back to, with the variable
/// prefix each one is bound under.
const CREATED_ITEM_PRODUCERS: &[(&str, &str, &str, &str)] = &[
    ("create_issue", "ISSUE", "issue_url", "issue_number"),
    (
        "create_discussion",
        "DISCUSSION",
        "discussion_url",
        "discussion_number",
    ),
    (
        "create_pull_request",
        "PULL_REQUEST",
        "pull_request_url",
        "pull_request_number",
    ),
];

/// Setup that must run before a type's side effect, gated like the step
/// itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PreStep {
    pub name: String,
    pub condition: Condition,
    pub uses: Option<String>,
    pub with: IndexMap<String, JsonValue>,
    pub env: IndexMap<String, String>,
    pub run: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepSpecification {
    /// Canonical type name; also the job key and step id.
    pub output_type: &'static str,
    pub name: String,
    pub id: String,
    pub script: &'static str,
    /// Bindings in the order the step declares them.
    pub env: IndexMap<String, String>,
    pub condition: Condition,
    pub token: ResolvedToken,
    pub pre_steps: Vec<PreStep>,
    /// Upstream jobs, the agent job first.
    pub needs: Vec<String>,
    pub permissions: BTreeMap<&'static str, Access>,
    /// Job outputs mapped to the step outputs that feed them.
    pub outputs: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JobSpecBuilder {
    strict_env: bool,
}

impl JobSpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns missing required bindings into [`ConfigError::MissingEnvBindings`]
    /// instead of warnings.
    pub fn strict_env(mut self, strict: bool) -> Self {
        self.strict_env = strict;
        self
    }

    pub fn build(&self, workflow: &WorkflowConfig) -> Result<Vec<StepSpecification>, ConfigError> {
        let started = Instant::now();
        let workflow_name = workflow
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(ConfigError::MissingWorkflowName)?;

        let mut steps = Vec::new();
        for (spec, type_config) in workflow.safe_outputs.enabled() {
            let step = self.build_step(workflow, workflow_name, spec, type_config)?;
            debug!(
                output_type = spec.name,
                token_source = ?step.token.source,
                env = step.env.len(),
                "built dispatch step"
            );
            steps.push(step);
        }

        telemetry::record_compilation(workflow_name, steps.len(), started.elapsed());
        Ok(steps)
    }

    fn build_step(
        &self,
        workflow: &WorkflowConfig,
        workflow_name: &str,
        spec: &'static TypeSpec,
        type_config: &TypeConfig,
    ) -> Result<StepSpecification, ConfigError> {
        let token = token::resolve(&TokenContext::new(workflow, spec))?;

        let mut condition =
            condition::safe_output_type(AGENT_JOB, spec.name, type_config.min.unwrap_or(0));
        let mut needs = vec![AGENT_JOB.to_string()];
        if workflow.safe_outputs.threat_detection {
            condition = condition.and(condition::detection_succeeded());
            needs.push(DETECTION_JOB.to_string());
        }

        let mut vars = common_env(workflow, workflow_name, type_config);
        type_env(workflow, spec, type_config, &mut vars, &mut needs);
        let mut env = vars.0;
        for (key, value) in &workflow.safe_outputs.env {
            if env.contains_key(key) {
                warn!(
                    output_type = spec.name,
                    key = %key,
                    "custom env cannot replace a built-in binding"
                );
                continue;
            }
            env.insert(key.clone(), value.clone());
        }
        self.check_env(spec, &env)?;

        let pre_steps = if spec.needs_checkout {
            checkout_steps(&condition, &token)
        } else {
            Vec::new()
        };

        Ok(StepSpecification {
            output_type: spec.name,
            name: spec.title.to_string(),
            id: spec.name.to_string(),
            script: spec.script,
            env,
            condition,
            token,
            pre_steps,
            needs,
            permissions: spec.permissions.iter().copied().collect(),
            outputs: spec
                .outputs
                .iter()
                .map(|output| {
                    (
                        (*output).to_string(),
                        format!("${{{{ steps.{}.outputs.{output} }}}}", spec.name),
                    )
                })
                .collect(),
        })
    }

    fn check_env(
        &self,
        spec: &TypeSpec,
        env: &IndexMap<String, String>,
    ) -> Result<(), ConfigError> {
        let missing =
            manifest::missing_required_env_vars(spec.name, env.keys().map(String::as_str));
        if missing.is_empty() {
            return Ok(());
        }
        let missing: Vec<String> = missing.into_iter().map(str::to_string).collect();
        if self.strict_env {
            return Err(ConfigError::MissingEnvBindings {
                job: spec.name.to_string(),
                missing,
            });
        }
        warn!(
            job = spec.name,
            missing = %missing.join(", "),
            "dispatch step is missing required environment bindings"
        );
        Ok(())
    }
}

/// Builds step specifications with advisory environment checks.
pub fn build(workflow: &WorkflowConfig) -> Result<Vec<StepSpecification>, ConfigError> {
    JobSpecBuilder::new().build(workflow)
}

fn common_env(
    workflow: &WorkflowConfig,
    workflow_name: &str,
    type_config: &TypeConfig,
) -> EnvBuilder {
    let safe_outputs = &workflow.safe_outputs;
    let mut env = EnvBuilder::default();
    env.set(
        "GH_AW_AGENT_OUTPUT",
        format!("${{{{ needs.{AGENT_JOB}.outputs.output }}}}"),
    );
    env.set("GH_AW_WORKFLOW_NAME", workflow_name);
    env.set_opt("GH_AW_WORKFLOW_ID", workflow.workflow_id.as_deref());
    env.set_opt("GH_AW_WORKFLOW_SOURCE", workflow.source.as_deref());
    env.set_opt("GH_AW_WORKFLOW_SOURCE_URL", workflow.source_url.as_deref());
    env.set_opt("GH_AW_TRACKER_ID", workflow.tracker_id.as_deref());
    if let Some(engine) = &workflow.engine {
        env.set("GH_AW_ENGINE_ID", engine.id.as_str());
        env.set_opt("GH_AW_ENGINE_VERSION", engine.version.as_deref());
        env.set_opt("GH_AW_ENGINE_MODEL", engine.model.as_deref());
    }
    if safe_outputs.staged {
        env.set("GH_AW_SAFE_OUTPUTS_STAGED", "true");
    }
    env.set_opt(
        "GH_AW_TARGET_REPO_SLUG",
        type_config
            .target_repo
            .as_deref()
            .or(safe_outputs.target_repo.as_deref()),
    );
    env.set_opt("GH_AW_SAFE_OUTPUT_MESSAGES", safe_outputs.messages_json());
    env.set("GITHUB_TOKEN", "${{ github.token }}");
    env
}

fn type_env(
    workflow: &WorkflowConfig,
    spec: &TypeSpec,
    config: &TypeConfig,
    vars: &mut EnvBuilder,
    needs: &mut Vec<String>,
) {
    match spec.name {
        "create_issue" => {
            vars.set_opt("GH_AW_ISSUE_TITLE_PREFIX", config.title_prefix.as_deref());
            vars.set_list("GH_AW_ISSUE_LABELS", &config.labels);
        }
        "create_discussion" => {
            vars.set_opt("GH_AW_DISCUSSION_CATEGORY", config.category.as_deref());
            vars.set_opt("GH_AW_DISCUSSION_TITLE_PREFIX", config.title_prefix.as_deref());
            vars.set_list("GH_AW_DISCUSSION_LABELS", &config.labels);
        }
        "add_comment" => {
            vars.set_opt("GH_AW_COMMENT_TARGET", config.target.as_deref());
            if config.hide_older_comments == Some(true) {
                vars.set("GH_AW_HIDE_OLDER_COMMENTS", "true");
            }
            for (producer, suffix, url, number) in CREATED_ITEM_PRODUCERS {
                if !workflow.safe_outputs.is_enabled(producer) {
                    continue;
                }
                vars.set(
                    format!("GH_AW_CREATED_{suffix}_URL"),
                    format!("${{{{ needs.{producer}.outputs.{url} }}}}"),
                );
                vars.set(
                    format!("GH_AW_CREATED_{suffix}_NUMBER"),
                    format!("${{{{ needs.{producer}.outputs.{number} }}}}"),
                );
                needs.push((*producer).to_string());
            }
        }
        "create_pull_request" => {
            vars.set(
                "GH_AW_WORKFLOW_ID",
                workflow.workflow_id.as_deref().unwrap_or(AGENT_JOB),
            );
            vars.set("GH_AW_BASE_BRANCH", "${{ github.ref_name }}");
            vars.set_opt("GH_AW_PR_TITLE_PREFIX", config.title_prefix.as_deref());
            vars.set_list("GH_AW_PR_LABELS", &config.labels);
            vars.set_list("GH_AW_PR_ALLOWED_LABELS", &config.allowed_labels);
            vars.set("GH_AW_PR_DRAFT", config.draft.unwrap_or(true).to_string());
            vars.set(
                "GH_AW_PR_IF_NO_CHANGES",
                config.if_no_changes.unwrap_or_default().as_str(),
            );
            vars.set(
                "GH_AW_PR_ALLOW_EMPTY",
                config.allow_empty.unwrap_or(false).to_string(),
            );
            vars.set("GH_AW_MAX_PATCH_SIZE", max_patch_size(config));
            vars.set_opt("GH_AW_PR_EXPIRES", config.expires.map(|days| days.to_string()));
        }
        "create_pull_request_review_comment" => {
            vars.set_opt("GH_AW_PR_REVIEW_COMMENT_TARGET", config.target.as_deref());
            vars.set_opt("GH_AW_PR_REVIEW_COMMENT_SIDE", config.side.as_deref());
        }
        "create_code_scanning_alert" => {
            vars.set_opt("GH_AW_WORKFLOW_FILENAME", workflow_filename(workflow));
            vars.set_opt("GH_AW_SECURITY_REPORT_DRIVER", workflow.name.as_deref());
            vars.set_opt("GH_AW_SECURITY_REPORT_MAX", config.max.map(|max| max.to_string()));
        }
        "push_to_pull_request_branch" => {
            vars.set(
                "GH_AW_PUSH_TARGET",
                config.target.as_deref().unwrap_or("triggering"),
            );
            vars.set_opt(
                "GH_AW_PR_TITLE_PREFIX",
                config.required_title_prefix.as_deref(),
            );
            vars.set_list("GH_AW_PR_LABELS", &config.required_labels);
            vars.set(
                "GH_AW_PUSH_IF_NO_CHANGES",
                config
                    .if_no_changes
                    .unwrap_or(IfNoChanges::Warn)
                    .as_str(),
            );
            vars.set("GH_AW_MAX_PATCH_SIZE", max_patch_size(config));
        }
        "missing_tool" => {
            vars.set_opt("GH_AW_MISSING_TOOL_MAX", config.max.map(|max| max.to_string()));
        }
        _ => {}
    }
}

fn max_patch_size(config: &TypeConfig) -> String {
    config
        .max_patch_size
        .unwrap_or(DEFAULT_MAX_PATCH_SIZE_KB)
        .to_string()
}

/// Explicit workflow id, else the stem of the source file.
fn workflow_filename(workflow: &WorkflowConfig) -> Option<String> {
    if let Some(id) = &workflow.workflow_id {
        return Some(id.clone());
    }
    let source = workflow.source.as_deref()?;
    Path::new(source)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

/// Checkout with the resolved credential, then a bot identity and a remote
/// that carries the same credential.
fn checkout_steps(condition: &Condition, token: &ResolvedToken) -> Vec<PreStep> {
    let checkout = PreStep {
        name: "Checkout repository".to_string(),
        condition: condition.clone(),
        uses: Some(CHECKOUT_ACTION.to_string()),
        with: IndexMap::from([
            ("token".to_string(), JsonValue::from(token.expression.clone())),
            ("persist-credentials".to_string(), JsonValue::from(false)),
            ("fetch-depth".to_string(), JsonValue::from(1)),
        ]),
        env: IndexMap::new(),
        run: None,
    };

    let script = [
        format!("git config --global user.email \"{GIT_BOT_EMAIL}\""),
        format!("git config --global user.name \"{GIT_BOT_NAME}\""),
        "SERVER_URL_STRIPPED=\"${SERVER_URL#https://}\"".to_string(),
        "git remote set-url origin \"https://x-access-token:${GIT_TOKEN}@${SERVER_URL_STRIPPED}/${REPO_NAME}.git\""
            .to_string(),
        "echo \"Git configured with standard GitHub Actions identity\"".to_string(),
    ]
    .join("\n");
    let configure = PreStep {
        name: "Configure Git credentials".to_string(),
        condition: condition.clone(),
        uses: None,
        with: IndexMap::new(),
        env: IndexMap::from([
            ("REPO_NAME".to_string(), "${{ github.repository }}".to_string()),
            ("SERVER_URL".to_string(), "${{ github.server_url }}".to_string()),
            ("GIT_TOKEN".to_string(), token.expression.clone()),
        ]),
        run: Some(script + "\n"),
    };

    vec![checkout, configure]
}

#[derive(Default)]
struct EnvBuilder(IndexMap<String, String>);

impl EnvBuilder {
    fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    fn set_opt<V: Into<String>>(&mut self, key: &str, value: Option<V>) {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    fn set_list(&mut self, key: &str, values: &[String]) {
        if !values.is_empty() {
            self.set(key, values.join(","));
        }
    }
}
