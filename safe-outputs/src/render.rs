//! Renders step specifications as platform jobs, one job per type.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::SafeOutputsError;
use crate::error::SafeOutputsResult;
use crate::registry::Access;
use crate::steps::PreStep;
use crate::steps::StepSpecification;

pub const GITHUB_SCRIPT_ACTION: &str = "actions/github-script@v8";
pub const RUNNER: &str = "ubuntu-slim";
pub const JOB_TIMEOUT_MINUTES: u32 = 15;
/// Where the setup step places the dispatcher scripts.
pub const SCRIPTS_DIR: &str = "/tmp/gh-aw/actions";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RenderedJob {
    pub needs: Vec<String>,
    #[serde(rename = "if")]
    pub condition: String,
    pub runs_on: &'static str,
    pub permissions: BTreeMap<&'static str, Access>,
    pub timeout_minutes: u32,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, String>,
    pub steps: Vec<RenderedStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedStep {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "if")]
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uses: Option<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub with: IndexMap<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

impl From<&PreStep> for RenderedStep {
    fn from(step: &PreStep) -> Self {
        Self {
            name: step.name.clone(),
            id: None,
            condition: step.condition.render(),
            uses: step.uses.clone(),
            env: step.env.clone(),
            with: step.with.clone(),
            run: step.run.clone(),
        }
    }
}

fn dispatch_script(script: &str) -> String {
    format!("const {{ main }} = require('{SCRIPTS_DIR}/{script}');\nawait main();\n")
}

impl From<&StepSpecification> for RenderedJob {
    fn from(spec: &StepSpecification) -> Self {
        let mut steps: Vec<RenderedStep> =
            spec.pre_steps.iter().map(RenderedStep::from).collect();
        steps.push(RenderedStep {
            name: spec.name.clone(),
            id: Some(spec.id.clone()),
            condition: spec.condition.render(),
            uses: Some(GITHUB_SCRIPT_ACTION.to_string()),
            env: spec.env.clone(),
            with: IndexMap::from([
                (
                    "github-token".to_string(),
                    JsonValue::from(spec.token.expression.clone()),
                ),
                (
                    "script".to_string(),
                    JsonValue::from(dispatch_script(spec.script)),
                ),
            ]),
            run: None,
        });

        Self {
            needs: spec.needs.clone(),
            condition: spec.condition.render(),
            runs_on: RUNNER,
            permissions: spec.permissions.clone(),
            timeout_minutes: JOB_TIMEOUT_MINUTES,
            outputs: spec.outputs.clone(),
            steps,
        }
    }
}

/// Jobs keyed by type name, in build order.
pub fn render_jobs(steps: &[StepSpecification]) -> IndexMap<String, RenderedJob> {
    steps
        .iter()
        .map(|step| (step.output_type.to_string(), RenderedJob::from(step)))
        .collect()
}

pub fn to_yaml(steps: &[StepSpecification]) -> SafeOutputsResult<String> {
    serde_yaml::to_string(&render_jobs(steps))
        .map_err(|err| SafeOutputsError::serialize("jobs", err))
}

pub fn to_json(steps: &[StepSpecification]) -> SafeOutputsResult<String> {
    serde_json::to_string_pretty(&render_jobs(steps))
        .map_err(|err| SafeOutputsError::serialize("jobs", err))
}
