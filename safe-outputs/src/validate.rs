use chrono::SecondsFormat;
use chrono::Utc;
use serde::Serialize;
use serde::Serializer;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::registry::Constraint;
use crate::registry::FieldDefault;
use crate::registry::FieldKind;
use crate::registry::FieldSpec;
use crate::registry::TypeSpec;
use crate::repair::RawRecord;
use crate::sanitize::RedactedDomainLog;
use crate::sanitize::Sanitizer;

/// A validated, sanitized record ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeOutputItem {
    spec: &'static TypeSpec,
    record: Map<String, Value>,
}

impl SafeOutputItem {
    pub fn type_name(&self) -> &'static str {
        self.spec.name
    }

    pub fn spec(&self) -> &'static TypeSpec {
        self.spec
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.record
    }
}

impl Serialize for SafeOutputItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.record.serialize(serializer)
    }
}

/// Checks `record` against `spec`, reporting every violation at once.
///
/// On success the fields are normalized (numeric strings become numbers,
/// enum values take their canonical spelling, defaults are filled in) and
/// every string is passed through `sanitizer`.
pub fn validate(
    record: RawRecord,
    spec: &'static TypeSpec,
    sanitizer: &Sanitizer,
    log: &mut RedactedDomainLog,
) -> Result<SafeOutputItem, Vec<String>> {
    let mut issues = Vec::new();
    let mut normalized = Map::new();
    normalized.insert("type".to_string(), Value::String(spec.name.to_string()));

    let mut record = record;
    record.remove("type");

    for field in spec.fields {
        let value = record.remove(field.name).filter(|value| !value.is_null());
        match value {
            Some(value) => match normalize(field, value) {
                Ok(value) => {
                    normalized.insert(field.name.to_string(), value);
                }
                Err(message) => issues.push(format_issue(spec, field, &message)),
            },
            None if field.required => issues.push(missing_message(spec, field)),
            None => {
                if let Some(default) = field.default {
                    normalized.insert(field.name.to_string(), default_value(default));
                }
            }
        }
    }

    for constraint in spec.constraints {
        if let Some(message) = check_constraint(spec, constraint, &normalized) {
            issues.push(message);
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }

    // Unknown extra fields ride along for the dispatcher.
    for (key, value) in record {
        normalized.insert(key, value);
    }
    for (key, value) in normalized.iter_mut() {
        if key != "type" {
            sanitize_value(value, sanitizer, log);
        }
    }

    Ok(SafeOutputItem {
        spec,
        record: normalized,
    })
}

/// Error strings here are suffixes; [`format_issue`] decides the prefix.
enum FieldError {
    WrongKind,
    Message(String),
}

fn normalize(field: &FieldSpec, value: Value) -> Result<Value, FieldError> {
    match field.kind {
        FieldKind::String => match value {
            Value::String(_) => Ok(value),
            _ => Err(FieldError::WrongKind),
        },
        FieldKind::PositiveInteger => {
            let number = to_number(&value).ok_or(FieldError::WrongKind)?;
            match positive_integer(&number) {
                Some(n) => Ok(Value::Number(n.into())),
                None => Err(FieldError::Message(format!(
                    "'{}' must be a positive integer",
                    field.name
                ))),
            }
        }
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value),
            Value::String(ref text) if text.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(ref text) if text.eq_ignore_ascii_case("false") => {
                Ok(Value::Bool(false))
            }
            _ => Err(FieldError::WrongKind),
        },
        FieldKind::StringArray => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(Value::Array(items)),
            Value::Array(_) => Err(FieldError::Message(format!(
                "'{}' must be an array of strings",
                field.name
            ))),
            _ => Err(FieldError::WrongKind),
        },
        FieldKind::Enum(allowed) => {
            let Value::String(text) = value else {
                return Err(FieldError::WrongKind);
            };
            let text = text.trim();
            allowed
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(text))
                .map(|canonical| Value::String((*canonical).to_string()))
                .ok_or_else(|| {
                    FieldError::Message(format!(
                        "'{}' must be one of: {}",
                        field.name,
                        allowed.join(", ")
                    ))
                })
        }
    }
}

fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(number) => Some(number.clone()),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(int) = text.parse::<i64>() {
                Some(int.into())
            } else {
                text.parse::<f64>()
                    .ok()
                    .filter(|float| float.is_finite())
                    .and_then(Number::from_f64)
            }
        }
        _ => None,
    }
}

fn positive_integer(number: &Number) -> Option<u64> {
    if let Some(n) = number.as_u64() {
        return (n > 0).then_some(n);
    }
    let float = number.as_f64()?;
    (float >= 1.0 && float.fract() == 0.0 && float <= u64::MAX as f64).then_some(float as u64)
}

fn kind_label(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::String | FieldKind::Enum(_) => "string",
        FieldKind::PositiveInteger => "number",
        FieldKind::Boolean => "boolean",
        FieldKind::StringArray => "array",
    }
}

fn missing_message(spec: &TypeSpec, field: &FieldSpec) -> String {
    format!(
        "{} requires a '{}' {} field",
        spec.name,
        field.name,
        kind_label(field.kind)
    )
}

fn format_issue(spec: &TypeSpec, field: &FieldSpec, error: &FieldError) -> String {
    match error {
        FieldError::Message(message) => message.clone(),
        FieldError::WrongKind if field.required => missing_message(spec, field),
        FieldError::WrongKind => {
            let article = match field.kind {
                FieldKind::StringArray => "an",
                _ => "a",
            };
            format!(
                "'{}' must be {article} {}",
                field.name,
                kind_label(field.kind)
            )
        }
    }
}

fn check_constraint(
    spec: &TypeSpec,
    constraint: &Constraint,
    record: &Map<String, Value>,
) -> Option<String> {
    match *constraint {
        Constraint::LessOrEqual(lower, upper) => {
            let low = record.get(lower).and_then(Value::as_f64)?;
            let high = record.get(upper).and_then(Value::as_f64)?;
            (low > high).then(|| format!("'{lower}' must be less than or equal to '{upper}'"))
        }
        Constraint::AtLeastOneOf(fields) => {
            let present = fields.iter().any(|field| record.contains_key(*field));
            (!present).then(|| {
                let names: Vec<String> = fields.iter().map(|field| format!("'{field}'")).collect();
                format!("{} requires at least one of: {}", spec.name, names.join(", "))
            })
        }
        Constraint::Distinct(left, right) => {
            let a = record.get(left)?;
            let b = record.get(right)?;
            (a == b).then(|| format!("'{left}' and '{right}' must be different"))
        }
        Constraint::NonEmpty(field) => {
            let items = record.get(field).and_then(Value::as_array)?;
            items
                .is_empty()
                .then(|| format!("'{field}' must not be empty"))
        }
    }
}

fn default_value(default: FieldDefault) -> Value {
    match default {
        FieldDefault::Str(text) => Value::String(text.to_string()),
        FieldDefault::Bool(flag) => Value::Bool(flag),
        FieldDefault::Timestamp => {
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
        }
    }
}

fn sanitize_value(value: &mut Value, sanitizer: &Sanitizer, log: &mut RedactedDomainLog) {
    match value {
        Value::String(text) => *text = sanitizer.sanitize(text, log),
        Value::Array(items) => {
            for item in items {
                sanitize_value(item, sanitizer, log);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_value(item, sanitizer, log);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::lookup;
    use crate::sanitize::SanitizePolicy;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(spec: &str, value: Value) -> Result<SafeOutputItem, Vec<String>> {
        let Value::Object(record) = value else {
            panic!("test records are objects");
        };
        let sanitizer = Sanitizer::new(SanitizePolicy::default());
        let mut log = RedactedDomainLog::new();
        validate(record, lookup(spec).unwrap(), &sanitizer, &mut log)
    }

    #[test]
    fn missing_body_is_reported() {
        let issues =
            run("create_issue", json!({"type": "create-issue", "title": "T"})).unwrap_err();
        assert_eq!(issues, vec!["create_issue requires a 'body' string field"]);
    }

    #[test]
    fn every_violation_is_reported() {
        let issues = run(
            "create_pull_request_review_comment",
            json!({
                "type": "create_pull_request_review_comment",
                "line": 3,
                "start_line": "9",
                "side": "middle",
                "body": 42
            }),
        )
        .unwrap_err();
        assert_eq!(
            issues,
            vec![
                "create_pull_request_review_comment requires a 'path' string field",
                "create_pull_request_review_comment requires a 'body' string field",
                "'side' must be one of: LEFT, RIGHT",
                "'start_line' must be less than or equal to 'line'",
            ]
        );
    }

    #[test]
    fn numbers_and_enums_are_normalized() {
        let item = run(
            "create_code_scanning_alert",
            json!({
                "type": "create-code-scanning-alert",
                "file": "src/main.rs",
                "line": "12",
                "severity": "ERROR",
                "message": "unchecked input"
            }),
        )
        .unwrap();
        assert_eq!(item.get("line"), Some(&json!(12)));
        assert_eq!(item.get("severity"), Some(&json!("error")));
        assert_eq!(item.get("type"), Some(&json!("create_code_scanning_alert")));
    }

    #[test]
    fn invalid_severity_lists_choices() {
        let issues = run(
            "create_code_scanning_alert",
            json!({"file": "a", "line": 1, "severity": "fatal", "message": "m"}),
        )
        .unwrap_err();
        assert_eq!(issues, vec!["'severity' must be one of: error, warning, info, note"]);
    }

    #[test]
    fn defaults_are_filled_and_strings_sanitized() {
        let item = run(
            "create_pull_request_review_comment",
            json!({"path": "a.rs", "line": 4, "body": "cc @octocat <script>"}),
        )
        .unwrap();
        assert_eq!(item.get("side"), Some(&json!("RIGHT")));
        assert_eq!(item.get("body"), Some(&json!("cc `@octocat` (script)")));
    }

    #[test]
    fn optional_kind_mismatch_uses_field_message() {
        let issues = run(
            "create_issue",
            json!({"title": "t", "body": "b", "labels": "bug"}),
        )
        .unwrap_err();
        assert_eq!(issues, vec!["'labels' must be an array"]);
    }

    #[test]
    fn cross_field_rules_apply() {
        let issues = run("update_issue", json!({"issue_number": 3})).unwrap_err();
        assert_eq!(
            issues,
            vec!["update_issue requires at least one of: 'status', 'title', 'body'"]
        );
        let issues = run(
            "link_sub_issue",
            json!({"parent_issue_number": 5, "sub_issue_number": "5"}),
        )
        .unwrap_err();
        assert_eq!(
            issues,
            vec!["'parent_issue_number' and 'sub_issue_number' must be different"]
        );
        let issues = run("add_labels", json!({"labels": []})).unwrap_err();
        assert_eq!(issues, vec!["'labels' must not be empty"]);
    }

    #[test]
    fn positive_integers_reject_zero() {
        let issues = run("assign_milestone", json!({"milestone_number": 0})).unwrap_err();
        assert_eq!(issues, vec!["'milestone_number' must be a positive integer"]);
    }

    #[test]
    fn fractional_numbers_are_not_positive_integers() {
        let issues = run(
            "create_code_scanning_alert",
            json!({
                "file": "a",
                "line": "3.0",
                "severity": "note",
                "message": "m",
                "column": "2.5"
            }),
        )
        .unwrap_err();
        assert_eq!(issues, vec!["'column' must be a positive integer"]);
    }

    #[test]
    fn missing_tool_is_timestamped() {
        let record = json!({"tool": "docker", "reason": "not installed"});
        let item = run("missing_tool", record).unwrap();
        let stamp = item.get("timestamp").and_then(Value::as_str).unwrap();
        assert!(stamp.ends_with('Z'), "{stamp}");
    }
}
