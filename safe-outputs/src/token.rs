//! Credential precedence for dispatch steps.
//!
//! Resolution walks [`RESOLVERS`] in order and the first source that yields
//! a non-empty expression wins. Every type goes through the same chain.

use serde::Serialize;

use crate::config::TypeConfig;
use crate::config::WorkflowConfig;
use crate::error::ConfigError;
use crate::registry::TypeSpec;

/// Ambient credential used when nothing more specific is configured.
pub const DEFAULT_TOKEN: &str = "${{ secrets.GH_AW_GITHUB_TOKEN || secrets.GITHUB_TOKEN }}";

/// Fallback for types the Copilot engine drives with its own credential.
pub const COPILOT_TOKEN: &str = "${{ secrets.COPILOT_GITHUB_TOKEN || secrets.GH_AW_GITHUB_TOKEN }}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenSource {
    TypeConfig,
    SafeOutputs,
    Workflow,
    Engine,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub expression: String,
    pub source: TokenSource,
}

/// Everything the resolvers may consult for one type.
#[derive(Debug, Clone, Copy)]
pub struct TokenContext<'a> {
    pub spec: &'static TypeSpec,
    pub type_config: Option<&'a TypeConfig>,
    pub safe_outputs_token: Option<&'a str>,
    pub workflow_token: Option<&'a str>,
    pub engine_id: Option<&'a str>,
}

impl<'a> TokenContext<'a> {
    pub fn new(workflow: &'a WorkflowConfig, spec: &'static TypeSpec) -> Self {
        Self {
            spec,
            type_config: workflow.safe_outputs.type_config(spec.name),
            safe_outputs_token: workflow.safe_outputs.github_token.as_deref(),
            workflow_token: workflow.github_token.as_deref(),
            engine_id: workflow.engine_id(),
        }
    }
}

type Resolver = fn(&TokenContext<'_>) -> Option<String>;

const RESOLVERS: &[(TokenSource, Resolver)] = &[
    (TokenSource::TypeConfig, type_token),
    (TokenSource::SafeOutputs, safe_outputs_token),
    (TokenSource::Workflow, workflow_token),
    (TokenSource::Engine, engine_fallback),
];

fn type_token(ctx: &TokenContext<'_>) -> Option<String> {
    non_empty(ctx.type_config.and_then(|config| config.github_token.as_deref()))
}

fn safe_outputs_token(ctx: &TokenContext<'_>) -> Option<String> {
    non_empty(ctx.safe_outputs_token)
}

fn workflow_token(ctx: &TokenContext<'_>) -> Option<String> {
    non_empty(ctx.workflow_token)
}

fn non_empty(token: Option<&str>) -> Option<String> {
    token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn engine_fallback(ctx: &TokenContext<'_>) -> Option<String> {
    match (ctx.engine_id, ctx.spec.name) {
        (Some("copilot"), "create_agent_task") => Some(COPILOT_TOKEN.to_string()),
        _ => None,
    }
}

/// Resolves the credential for one type.
///
/// Types that cannot act with the ambient credential fail instead of
/// falling through to [`DEFAULT_TOKEN`].
pub fn resolve(ctx: &TokenContext<'_>) -> Result<ResolvedToken, ConfigError> {
    for (source, resolver) in RESOLVERS {
        if let Some(expression) = resolver(ctx) {
            return Ok(ResolvedToken {
                expression,
                source: *source,
            });
        }
    }
    if ctx.spec.needs_custom_token {
        return Err(ConfigError::UnresolvedCredential(ctx.spec.config_key()));
    }
    Ok(ResolvedToken {
        expression: DEFAULT_TOKEN.to_string(),
        source: TokenSource::Default,
    })
}
