use aw_safe_outputs::BatchCollector;
use aw_safe_outputs::SafeOutputsConfig;
use aw_safe_outputs::SanitizePolicy;
use aw_safe_outputs::sanitize::sanitize;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn collector(config: &str) -> BatchCollector {
    BatchCollector::from_config(&SafeOutputsConfig::from_yaml_str(config).unwrap())
}

#[test]
fn single_valid_issue_is_collected() {
    let batch = collector(r#"{"create-issue":true}"#)
        .collect(r#"{"type":"create-issue","title":"T","body":"B"}"#);
    assert_eq!(batch.items().len(), 1);
    assert!(batch.errors().is_empty());
    assert!(batch.check().is_ok());
    assert_eq!(
        serde_json::to_value(&batch.items()[0]).unwrap(),
        json!({"type": "create_issue", "title": "T", "body": "B"})
    );
}

#[test]
fn missing_body_fails_the_collection() {
    let batch =
        collector(r#"{"create-issue":true}"#).collect(r#"{"type":"create-issue","title":"T"}"#);
    assert!(batch.items().is_empty());
    assert_eq!(batch.errors().len(), 1);
    assert!(
        batch.errors()[0].contains("requires a 'body' string field"),
        "{:?}",
        batch.errors()
    );
    let err = batch.check().unwrap_err();
    assert!(err.to_string().contains("requires a 'body' string field"));
}

#[test]
fn third_issue_exceeds_quota() {
    let input = (1..=3)
        .map(|n| format!(r#"{{"type":"create-issue","title":"T{n}","body":"B"}}"#))
        .collect::<Vec<_>>()
        .join("\n");
    let batch = collector(r#"{"create-issue":{"max":2}}"#).collect(&input);
    assert_eq!(batch.items().len(), 2);
    assert_eq!(
        batch.errors(),
        &["Line 3: Too many items of type 'create_issue'. Maximum allowed: 2".to_string()]
    );
    assert!(batch.check().is_ok());
}

#[test]
fn loose_json_is_repaired() {
    let batch = collector(r#"{"create-issue":true}"#)
        .collect("{type: 'create-issue', title: 'x', body: 'y',}");
    assert_eq!(batch.errors(), &[] as &[String]);
    assert_eq!(batch.items().len(), 1);
    assert_eq!(batch.items()[0].get("title"), Some(&json!("x")));
}

#[test]
fn mentions_and_plain_http_are_neutralized() {
    let out = sanitize(
        "Hello @octocat, see http://evil.test/a",
        &SanitizePolicy::default(),
    );
    assert!(out.contains("`@octocat`"), "{out}");
    assert!(out.contains("(redacted)"), "{out}");
    assert!(!out.contains("evil.test"), "{out}");
}

#[test]
fn multi_line_string_values_split_into_two_failed_lines() {
    let batch = collector(r#"{"create-issue":true}"#)
        .collect("{\"type\":\"create-issue\",\"title\":\"T\",\"body\":\"first\nsecond\"}");
    assert!(batch.items().is_empty());
    assert_eq!(batch.errors().len(), 2);
    assert!(batch.errors()[0].starts_with("Line 1: JSON parsing failed"));
    assert!(batch.errors()[1].starts_with("Line 2: JSON parsing failed"));
}

#[test]
fn artifact_and_redaction_log_are_written() {
    let dir = TempDir::new().unwrap();
    let artifact = dir.path().join("safeoutputs/agent_output.json");
    let redacted_log = dir.path().join("redacted-urls.log");

    let batch = collector(r#"{"add-comment":true}"#).collect(
        r#"{"type":"add_comment","body":"see https://evil.example/a and ftp://files.test/b"}"#,
    );
    batch.write_artifact(&artifact).unwrap();
    assert!(batch.redacted_domains().write_to(&redacted_log).unwrap());

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&artifact).unwrap()).unwrap();
    assert_eq!(
        written,
        json!({
            "items": [{"type": "add_comment", "body": "see (redacted) and (redacted)"}],
            "errors": []
        })
    );
    let logged = fs::read_to_string(&redacted_log).unwrap();
    let logged: Vec<&str> = logged.lines().collect();
    assert_eq!(logged, vec!["files.test", "evil.example"]);
}

#[test]
fn clean_run_writes_no_redaction_log() {
    let dir = TempDir::new().unwrap();
    let redacted_log = dir.path().join("redacted-urls.log");
    let batch = collector(r#"{"noop":true}"#).collect(r#"{"type":"noop","message":"all good"}"#);
    assert!(!batch.redacted_domains().write_to(&redacted_log).unwrap());
    assert!(!redacted_log.exists());
}
