//! Environment contract of each dispatch job: which variables its step
//! reads, which of them must be bound, and what the dispatcher assumes when
//! an optional one is absent.

use serde::Serialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::registry;

use self::EnvVarManifestEntry as Var;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnvVarManifestEntry {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<&'static str>,
}

impl EnvVarManifestEntry {
    const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            required: true,
            description,
            default: None,
        }
    }

    const fn optional(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            required: false,
            description,
            default: None,
        }
    }

    const fn defaulted(
        name: &'static str,
        description: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            required: false,
            description,
            default: Some(default),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobManifest {
    pub job_type: &'static str,
    pub description: &'static str,
    /// Variables on top of [`COMMON_ENV_VARS`].
    pub env_vars: &'static [EnvVarManifestEntry],
}

/// Bound on every dispatch step.
pub const COMMON_ENV_VARS: &[EnvVarManifestEntry] = &[
    Var::required("GH_AW_WORKFLOW_NAME", "Workflow name"),
    Var::optional("GH_AW_WORKFLOW_SOURCE", "Workflow source file path"),
    Var::optional("GH_AW_WORKFLOW_SOURCE_URL", "URL of the workflow source file"),
    Var::optional("GH_AW_TRACKER_ID", "Tracker id stamped on created items"),
    Var::optional("GH_AW_ENGINE_ID", "Agent engine identifier"),
    Var::optional("GH_AW_ENGINE_VERSION", "Agent engine version"),
    Var::optional("GH_AW_ENGINE_MODEL", "Agent engine model"),
    Var::optional(
        "GH_AW_SAFE_OUTPUTS_STAGED",
        "'true' to preview side effects without performing them",
    ),
    Var::optional(
        "GH_AW_TARGET_REPO_SLUG",
        "owner/repo receiving the side effect instead of the current repository",
    ),
    Var::optional("GH_AW_SAFE_OUTPUT_MESSAGES", "JSON object of custom message templates"),
    Var::required("GITHUB_TOKEN", "Credential for API calls"),
];

const AGENT_OUTPUT: EnvVarManifestEntry =
    Var::required("GH_AW_AGENT_OUTPUT", "Collected batch from the agent job");
const MAX_PATCH_SIZE: EnvVarManifestEntry =
    Var::defaulted("GH_AW_MAX_PATCH_SIZE", "Maximum patch size in KiB", "1024");

static JOB_MANIFESTS: &[JobManifest] = &[
    JobManifest {
        job_type: "create_issue",
        description: "Creates issues from agent output",
        env_vars: &[
            AGENT_OUTPUT,
            Var::optional("GH_AW_ISSUE_TITLE_PREFIX", "Prefix for issue titles"),
            Var::optional("GH_AW_ISSUE_LABELS", "Comma-separated labels for created issues"),
        ],
    },
    JobManifest {
        job_type: "create_discussion",
        description: "Creates discussions from agent output",
        env_vars: &[
            AGENT_OUTPUT,
            Var::optional("GH_AW_DISCUSSION_CATEGORY", "Discussion category id or name"),
            Var::optional("GH_AW_DISCUSSION_TITLE_PREFIX", "Prefix for discussion titles"),
            Var::optional(
                "GH_AW_DISCUSSION_LABELS",
                "Comma-separated labels for created discussions",
            ),
        ],
    },
    JobManifest {
        job_type: "add_comment",
        description: "Comments on issues, pull requests or discussions",
        env_vars: &[
            Var::optional(
                "GH_AW_COMMENT_TARGET",
                "'triggering' (default), '*' or an item number",
            ),
            Var::optional("GH_AW_HIDE_OLDER_COMMENTS", "'true' to minimize earlier comments"),
            Var::optional("GH_AW_CREATED_ISSUE_URL", "Issue URL from the create_issue job"),
            Var::optional("GH_AW_CREATED_ISSUE_NUMBER", "Issue number from the create_issue job"),
            Var::optional(
                "GH_AW_CREATED_DISCUSSION_URL",
                "Discussion URL from the create_discussion job",
            ),
            Var::optional(
                "GH_AW_CREATED_DISCUSSION_NUMBER",
                "Discussion number from the create_discussion job",
            ),
            Var::optional(
                "GH_AW_CREATED_PULL_REQUEST_URL",
                "Pull request URL from the create_pull_request job",
            ),
            Var::optional(
                "GH_AW_CREATED_PULL_REQUEST_NUMBER",
                "Pull request number from the create_pull_request job",
            ),
        ],
    },
    JobManifest {
        job_type: "create_pull_request",
        description: "Opens a pull request from the agent's changes",
        env_vars: &[
            Var::required("GH_AW_WORKFLOW_ID", "Agent job name used for branch naming"),
            Var::required("GH_AW_BASE_BRANCH", "Branch the pull request targets"),
            AGENT_OUTPUT,
            Var::optional("GH_AW_PR_TITLE_PREFIX", "Prefix for pull request titles"),
            Var::optional("GH_AW_PR_LABELS", "Comma-separated labels for the pull request"),
            Var::optional("GH_AW_PR_ALLOWED_LABELS", "Comma-separated labels the agent may add"),
            Var::defaulted("GH_AW_PR_DRAFT", "'true' to open as a draft", "true"),
            Var::defaulted(
                "GH_AW_PR_IF_NO_CHANGES",
                "'warn', 'error' or 'ignore' when there is nothing to commit",
                "warn",
            ),
            Var::defaulted(
                "GH_AW_PR_ALLOW_EMPTY",
                "'true' to open a pull request without changes",
                "false",
            ),
            MAX_PATCH_SIZE,
            Var::optional("GH_AW_PR_EXPIRES", "Days until the pull request is closed"),
            Var::optional("GH_AW_COMMENT_ID", "Status comment id from the activation job"),
            Var::optional("GH_AW_COMMENT_REPO", "Repository of the status comment"),
        ],
    },
    JobManifest {
        job_type: "create_pull_request_review_comment",
        description: "Leaves review comments on pull request diffs",
        env_vars: &[
            AGENT_OUTPUT,
            Var::optional("GH_AW_PR_REVIEW_COMMENT_TARGET", "Pull request to review"),
            Var::optional("GH_AW_PR_REVIEW_COMMENT_SIDE", "Diff side, 'LEFT' or 'RIGHT'"),
        ],
    },
    JobManifest {
        job_type: "create_code_scanning_alert",
        description: "Uploads findings as code scanning alerts",
        env_vars: &[
            AGENT_OUTPUT,
            Var::required("GH_AW_WORKFLOW_FILENAME", "Workflow file name used for the SARIF run"),
            Var::optional("GH_AW_SECURITY_REPORT_DRIVER", "Tool driver name in the SARIF run"),
            Var::optional("GH_AW_SECURITY_REPORT_MAX", "Maximum number of findings"),
        ],
    },
    JobManifest {
        job_type: "add_labels",
        description: "Adds labels to issues or pull requests",
        env_vars: &[],
    },
    JobManifest {
        job_type: "push_to_pull_request_branch",
        description: "Pushes the agent's changes to an existing pull request branch",
        env_vars: &[
            AGENT_OUTPUT,
            Var::required("GH_AW_PUSH_TARGET", "Pull request whose branch receives the push"),
            Var::optional("GH_AW_PR_TITLE_PREFIX", "Required title prefix of the target"),
            Var::optional("GH_AW_PR_LABELS", "Required labels of the target"),
            Var::defaulted(
                "GH_AW_PUSH_IF_NO_CHANGES",
                "'warn', 'error' or 'ignore' when there is nothing to push",
                "warn",
            ),
            MAX_PATCH_SIZE,
        ],
    },
    JobManifest {
        job_type: "create_agent_task",
        description: "Hands follow-up work to a coding agent",
        env_vars: &[
            AGENT_OUTPUT,
            Var::optional("GH_AW_AGENT_TASK_BASE", "Base branch for the agent task"),
        ],
    },
    JobManifest {
        job_type: "missing_tool",
        description: "Reports tools the agent needed but did not have",
        env_vars: &[
            AGENT_OUTPUT,
            Var::optional("GH_AW_MISSING_TOOL_MAX", "Maximum number of reports"),
        ],
    },
    JobManifest {
        job_type: "noop",
        description: "Logs messages without touching the platform",
        env_vars: &[],
    },
];

pub fn job_manifest(job_type: &str) -> Result<&'static JobManifest, ConfigError> {
    let canonical = registry::canonical_type_name(job_type);
    JOB_MANIFESTS
        .iter()
        .find(|manifest| manifest.job_type == canonical)
        .ok_or_else(|| ConfigError::UnknownOutputType(job_type.to_string()))
}

/// Common variables first, then the job's own.
pub fn all_env_vars(job_type: &str) -> Result<Vec<&'static EnvVarManifestEntry>, ConfigError> {
    let manifest = job_manifest(job_type)?;
    Ok(COMMON_ENV_VARS
        .iter()
        .chain(manifest.env_vars)
        .collect())
}

pub fn required_env_vars(job_type: &str) -> Result<Vec<&'static str>, ConfigError> {
    Ok(all_env_vars(job_type)?
        .into_iter()
        .filter(|entry| entry.required)
        .map(|entry| entry.name)
        .collect())
}

/// Required variables of `job_type` that `bound` does not contain, in
/// manifest order. Job types without a manifest have nothing to miss.
pub fn missing_required_env_vars<'a>(
    job_type: &str,
    bound: impl IntoIterator<Item = &'a str>,
) -> Vec<&'static str> {
    let Ok(required) = required_env_vars(job_type) else {
        debug!(job_type, "no environment manifest for job type");
        return Vec::new();
    };
    let bound: Vec<&str> = bound.into_iter().collect();
    required
        .into_iter()
        .filter(|name| !bound.contains(name))
        .collect()
}

pub fn supported_job_types() -> Vec<&'static str> {
    JOB_MANIFESTS
        .iter()
        .map(|manifest| manifest.job_type)
        .collect()
}
