use aw_safe_outputs::BatchCollector;
use aw_safe_outputs::ConfigError;
use aw_safe_outputs::JobSpecBuilder;
use aw_safe_outputs::TokenSource;
use aw_safe_outputs::WorkflowConfig;
use aw_safe_outputs::build_steps;
use aw_safe_outputs::jobs_to_yaml;
use aw_safe_outputs::manifest;
use pretty_assertions::assert_eq;
use serde_yaml::Value;
use std::fs;
use tempfile::TempDir;

const WORKFLOW: &str = r#"
name: Nightly Triage
workflow-id: nightly-triage
source: .github/workflows/nightly-triage.md
tracker-id: triage-bot
github-token: ${{ secrets.WORKFLOW_PAT }}
engine:
  id: copilot
  version: "1.2.3"
safe-outputs:
  staged: true
  threat-detection: true
  messages:
    footer: "> Generated by triage"
  create-issue:
    max: 3
    title-prefix: "[triage] "
    github-token: ${{ secrets.ISSUE_PAT }}
  add-comment:
    hide-older-comments: true
  create-pull-request:
    draft: false
    if-no-changes: error
    max-patch-size: 2048
  create-agent-task:
  missing-tool:
    min: 1
"#;

fn workflow() -> WorkflowConfig {
    WorkflowConfig::from_yaml_str(WORKFLOW).unwrap()
}

#[test]
fn credentials_follow_precedence_per_type() {
    let steps = build_steps(&workflow()).unwrap();
    let sources: Vec<_> = steps
        .iter()
        .map(|step| (step.output_type, step.token.source))
        .collect();
    assert_eq!(
        sources,
        vec![
            ("create_issue", TokenSource::TypeConfig),
            ("add_comment", TokenSource::Workflow),
            ("create_pull_request", TokenSource::Workflow),
            ("create_agent_task", TokenSource::Workflow),
            ("missing_tool", TokenSource::Workflow),
        ]
    );
}

#[test]
fn minimum_drops_the_membership_test() {
    let steps = build_steps(&workflow()).unwrap();
    let missing_tool = steps
        .iter()
        .find(|step| step.output_type == "missing_tool")
        .unwrap();
    let rendered = missing_tool.condition.render();
    assert!(!rendered.contains("output_types"), "{rendered}");
    assert!(rendered.contains("needs.detection.outputs.success == 'true'"));
}

#[test]
fn rendered_workflow_wires_jobs_together() {
    let steps = build_steps(&workflow()).unwrap();
    let yaml = jobs_to_yaml(&steps).unwrap();
    let doc: Value = serde_yaml::from_str(&yaml).unwrap();

    let comment = &doc["add_comment"];
    assert_eq!(
        comment["needs"],
        serde_yaml::from_str::<Value>("[agent, detection, create_issue, create_pull_request]")
            .unwrap()
    );
    let env = &comment["steps"][0]["env"];
    assert_eq!(env["GH_AW_HIDE_OLDER_COMMENTS"], Value::from("true"));
    assert_eq!(env["GH_AW_SAFE_OUTPUTS_STAGED"], Value::from("true"));
    assert_eq!(
        env["GH_AW_SAFE_OUTPUT_MESSAGES"],
        Value::from(r#"{"footer":"> Generated by triage"}"#)
    );
    assert_eq!(
        env["GH_AW_CREATED_PULL_REQUEST_URL"],
        Value::from("${{ needs.create_pull_request.outputs.pull_request_url }}")
    );

    let pull_request = &doc["create_pull_request"];
    assert_eq!(pull_request["permissions"]["contents"], Value::from("write"));
    let steps = pull_request["steps"].as_sequence().unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0]["uses"], Value::from("actions/checkout@v5"));
    assert_eq!(
        steps[0]["with"]["token"],
        Value::from("${{ secrets.WORKFLOW_PAT }}")
    );
    let env = &steps[2]["env"];
    assert_eq!(env["GH_AW_WORKFLOW_ID"], Value::from("nightly-triage"));
    assert_eq!(env["GH_AW_PR_DRAFT"], Value::from("false"));
    assert_eq!(env["GH_AW_PR_IF_NO_CHANGES"], Value::from("error"));
    assert_eq!(env["GH_AW_MAX_PATCH_SIZE"], Value::from("2048"));
    assert_eq!(env["GH_AW_ENGINE_VERSION"], Value::from("1.2.3"));
}

#[test]
fn compiled_steps_satisfy_their_manifests() {
    let steps = JobSpecBuilder::new()
        .strict_env(true)
        .build(&workflow())
        .unwrap();
    for step in &steps {
        let bound = step.env.keys().map(String::as_str);
        let missing = manifest::missing_required_env_vars(step.output_type, bound);
        assert!(missing.is_empty(), "{}: {missing:?}", step.output_type);
    }
}

#[test]
fn agent_task_without_credential_fails_to_compile() {
    let config = WorkflowConfig::from_yaml_str(
        "name: x\nengine: claude\nsafe-outputs:\n  create-agent-task:\n",
    )
    .unwrap();
    assert_eq!(
        build_steps(&config),
        Err(ConfigError::UnresolvedCredential(
            "create-agent-task".to_string()
        ))
    );

    let copilot = WorkflowConfig::from_yaml_str(
        "name: x\nengine: copilot\nsafe-outputs:\n  create-agent-task:\n",
    )
    .unwrap();
    let steps = build_steps(&copilot).unwrap();
    assert_eq!(steps[0].token.source, TokenSource::Engine);
}

#[test]
fn workflow_files_load_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("workflow.yml");
    fs::write(&path, WORKFLOW).unwrap();
    let loaded = WorkflowConfig::load(&path).unwrap();
    assert_eq!(loaded, workflow());
}

/// Evaluates the `contains(..output_types, '<needle>')` term of a rendered
/// gate against a collected batch summary.
fn gate_admits(rendered: &str, output_types: &str) -> bool {
    let (_, rest) = rendered
        .split_once("outputs.output_types, '")
        .unwrap_or_else(|| panic!("no membership test in {rendered}"));
    let (needle, _) = rest.split_once('\'').unwrap();
    output_types.contains(needle)
}

#[test]
fn review_comments_do_not_open_the_pull_request_gate() {
    let config = WorkflowConfig::from_yaml_str(
        "name: x\nsafe-outputs:\n  create-pull-request:\n  create-pull-request-review-comment:\n",
    )
    .unwrap();
    let steps = build_steps(&config).unwrap();
    let line =
        r#"{"type":"create_pull_request_review_comment","path":"a.rs","line":3,"body":"nit"}"#;
    let batch = BatchCollector::from_config(&config.safe_outputs).collect(line);
    assert_eq!(batch.items().len(), 1);
    let output_types = batch.output_types();

    let gates: Vec<_> = steps
        .iter()
        .map(|step| {
            let rendered = step.condition.render();
            (step.output_type, gate_admits(&rendered, &output_types))
        })
        .collect();
    assert_eq!(
        gates,
        vec![
            ("create_pull_request", false),
            ("create_pull_request_review_comment", true),
        ]
    );
}
