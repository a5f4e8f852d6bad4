//! Static registry of every safe output type the pipeline understands.
//!
//! Each entry is a plain [`TypeSpec`] value. Adding a type means adding one
//! entry to [`BUILTIN_TYPES`]; the validator, the quota enforcer and the job
//! spec builder all dispatch on the entry rather than on the type name.

use serde::Serialize;

use self::Access::Read;
use self::Access::Write;
use self::FieldKind::Boolean;
use self::FieldKind::PositiveInteger;
use self::FieldKind::String as Text;
use self::FieldKind::StringArray;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Native number or numeric string holding a whole number above zero,
    /// normalized to a JSON number.
    PositiveInteger,
    Boolean,
    StringArray,
    /// Matched case-insensitively and normalized to the listed spelling.
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    Str(&'static str),
    Bool(bool),
    /// Collection time as RFC 3339 UTC.
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<FieldDefault>,
}

impl FieldSpec {
    const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
        }
    }

    const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
        }
    }

    const fn defaulted(name: &'static str, kind: FieldKind, default: FieldDefault) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Both fields numeric and the first not greater than the second.
    LessOrEqual(&'static str, &'static str),
    AtLeastOneOf(&'static [&'static str]),
    Distinct(&'static str, &'static str),
    NonEmpty(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpec {
    /// Canonical underscore form, e.g. `create_issue`.
    pub name: &'static str,
    /// Human-readable step title.
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
    pub constraints: &'static [Constraint],
    /// Dispatcher script run by the generated step.
    pub script: &'static str,
    pub permissions: &'static [(&'static str, Access)],
    /// Outputs the dispatch job publishes for later jobs.
    pub outputs: &'static [&'static str],
    /// The side effect needs a writable checkout of the repository.
    pub needs_checkout: bool,
    /// The ambient default credential cannot perform this side effect.
    pub needs_custom_token: bool,
    /// Hard per-run cap that configuration cannot raise.
    pub max_cap: Option<usize>,
}

impl TypeSpec {
    /// Dash form used in workflow configuration, e.g. `create-issue`.
    pub fn config_key(&self) -> String {
        self.name.replace('_', "-")
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Normalizes `Create-Issue`, `create-issue` and `create_issue` alike.
pub fn canonical_type_name(name: &str) -> String {
    name.trim().replace('-', "_").to_ascii_lowercase()
}

pub fn lookup(name: &str) -> Option<&'static TypeSpec> {
    let canonical = canonical_type_name(name);
    BUILTIN_TYPES.iter().find(|spec| spec.name == canonical)
}

pub fn builtin_types() -> &'static [TypeSpec] {
    BUILTIN_TYPES
}

const SEVERITIES: &[&str] = &["error", "warning", "info", "note"];
const SIDES: &[&str] = &["LEFT", "RIGHT"];
const ISSUE_STATES: &[&str] = &["open", "closed"];
const UPDATE_OPERATIONS: &[&str] = &["append", "prepend", "replace"];
const DISCUSSION_CLOSE_REASONS: &[&str] = &["RESOLVED", "DUPLICATE", "OUTDATED", "ANSWERED"];
const HIDE_REASONS: &[&str] = &["SPAM", "ABUSE", "OFF_TOPIC", "OUTDATED", "RESOLVED"];

const ISSUE_WRITE: &[(&str, Access)] = &[("contents", Read), ("issues", Write)];
const PR_WRITE: &[(&str, Access)] = &[("contents", Read), ("pull-requests", Write)];
const DISCUSSION_WRITE: &[(&str, Access)] = &[("contents", Read), ("discussions", Write)];
const THREAD_WRITE: &[(&str, Access)] = &[
    ("contents", Read),
    ("discussions", Write),
    ("issues", Write),
    ("pull-requests", Write),
];
const READ_ONLY: &[(&str, Access)] = &[("contents", Read)];

const fn spec(name: &'static str, title: &'static str, script: &'static str) -> TypeSpec {
    TypeSpec {
        name,
        title,
        fields: &[],
        constraints: &[],
        script,
        permissions: READ_ONLY,
        outputs: &[],
        needs_checkout: false,
        needs_custom_token: false,
        max_cap: None,
    }
}

pub static BUILTIN_TYPES: &[TypeSpec] = &[
    TypeSpec {
        fields: &[
            FieldSpec::required("title", Text),
            FieldSpec::required("body", Text),
            FieldSpec::optional("labels", StringArray),
            FieldSpec::optional("temporary_id", Text),
        ],
        permissions: ISSUE_WRITE,
        outputs: &["issue_number", "issue_url"],
        ..spec("create_issue", "Create Issue", "create_issue.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("title", Text),
            FieldSpec::required("body", Text),
            FieldSpec::optional("category", Text),
        ],
        permissions: DISCUSSION_WRITE,
        outputs: &["discussion_number", "discussion_url"],
        ..spec("create_discussion", "Create Discussion", "create_discussion.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("body", Text),
            FieldSpec::optional("item_number", PositiveInteger),
        ],
        permissions: THREAD_WRITE,
        outputs: &["comment_id", "comment_url"],
        ..spec("add_comment", "Add Comment", "add_comment.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("title", Text),
            FieldSpec::required("body", Text),
            FieldSpec::optional("branch", Text),
            FieldSpec::optional("labels", StringArray),
            FieldSpec::optional("draft", Boolean),
        ],
        permissions: &[
            ("contents", Write),
            ("issues", Write),
            ("pull-requests", Write),
        ],
        outputs: &["pull_request_number", "pull_request_url", "branch_name"],
        needs_checkout: true,
        max_cap: Some(1),
        ..spec(
            "create_pull_request",
            "Create Pull Request",
            "create_pull_request.cjs",
        )
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("path", Text),
            FieldSpec::required("line", PositiveInteger),
            FieldSpec::required("body", Text),
            FieldSpec::optional("start_line", PositiveInteger),
            FieldSpec::defaulted("side", FieldKind::Enum(SIDES), FieldDefault::Str("RIGHT")),
        ],
        constraints: &[Constraint::LessOrEqual("start_line", "line")],
        permissions: PR_WRITE,
        outputs: &["review_comment_id", "review_comment_url"],
        ..spec(
            "create_pull_request_review_comment",
            "Create PR Review Comment",
            "create_pr_review_comment.cjs",
        )
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("file", Text),
            FieldSpec::required("line", PositiveInteger),
            FieldSpec::required("severity", FieldKind::Enum(SEVERITIES)),
            FieldSpec::required("message", Text),
            FieldSpec::optional("column", PositiveInteger),
            FieldSpec::optional("ruleIdSuffix", Text),
        ],
        permissions: &[
            ("actions", Read),
            ("contents", Read),
            ("security-events", Write),
        ],
        outputs: &["sarif_file", "findings_count"],
        ..spec(
            "create_code_scanning_alert",
            "Create Code Scanning Alert",
            "create_code_scanning_alert.cjs",
        )
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("labels", StringArray),
            FieldSpec::optional("item_number", PositiveInteger),
        ],
        constraints: &[Constraint::NonEmpty("labels")],
        permissions: &[
            ("contents", Read),
            ("issues", Write),
            ("pull-requests", Write),
        ],
        outputs: &["labels_added"],
        ..spec("add_labels", "Add Labels", "add_labels.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("reviewers", StringArray),
            FieldSpec::optional("pull_request_number", PositiveInteger),
        ],
        constraints: &[Constraint::NonEmpty("reviewers")],
        permissions: PR_WRITE,
        outputs: &["reviewers_added"],
        ..spec("add_reviewer", "Add Reviewer", "add_reviewer.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("milestone_number", PositiveInteger),
            FieldSpec::optional("issue_number", PositiveInteger),
        ],
        permissions: ISSUE_WRITE,
        ..spec("assign_milestone", "Assign Milestone", "assign_milestone.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::optional("status", FieldKind::Enum(ISSUE_STATES)),
            FieldSpec::optional("title", Text),
            FieldSpec::optional("body", Text),
            FieldSpec::optional("issue_number", PositiveInteger),
        ],
        constraints: &[Constraint::AtLeastOneOf(&["status", "title", "body"])],
        permissions: ISSUE_WRITE,
        outputs: &["issue_number", "issue_url"],
        ..spec("update_issue", "Update Issue", "update_issue.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::optional("title", Text),
            FieldSpec::optional("body", Text),
            FieldSpec::defaulted(
                "operation",
                FieldKind::Enum(UPDATE_OPERATIONS),
                FieldDefault::Str("replace"),
            ),
            FieldSpec::optional("pull_request_number", PositiveInteger),
        ],
        constraints: &[Constraint::AtLeastOneOf(&["title", "body"])],
        permissions: PR_WRITE,
        outputs: &["pull_request_number", "pull_request_url"],
        ..spec(
            "update_pull_request",
            "Update Pull Request",
            "update_pull_request.cjs",
        )
    },
    TypeSpec {
        fields: &[
            FieldSpec::optional("branch", Text),
            FieldSpec::optional("message", Text),
            FieldSpec::optional("pull_request_number", PositiveInteger),
        ],
        permissions: &[("contents", Write), ("pull-requests", Read)],
        outputs: &["branch_name", "commit_sha", "push_url"],
        needs_checkout: true,
        max_cap: Some(1),
        ..spec(
            "push_to_pull_request_branch",
            "Push to Pull Request Branch",
            "push_to_pull_request_branch.cjs",
        )
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("body", Text),
            FieldSpec::optional("issue_number", PositiveInteger),
        ],
        permissions: ISSUE_WRITE,
        outputs: &["issue_number", "issue_url"],
        ..spec("close_issue", "Close Issue", "close_issue.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("body", Text),
            FieldSpec::optional("reason", FieldKind::Enum(DISCUSSION_CLOSE_REASONS)),
            FieldSpec::optional("discussion_number", PositiveInteger),
        ],
        permissions: DISCUSSION_WRITE,
        outputs: &["discussion_number", "discussion_url"],
        ..spec("close_discussion", "Close Discussion", "close_discussion.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("body", Text),
            FieldSpec::optional("pull_request_number", PositiveInteger),
        ],
        permissions: PR_WRITE,
        outputs: &["pull_request_number", "pull_request_url"],
        ..spec(
            "close_pull_request",
            "Close Pull Request",
            "close_pull_request.cjs",
        )
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("comment_id", Text),
            FieldSpec::optional("reason", FieldKind::Enum(HIDE_REASONS)),
        ],
        permissions: THREAD_WRITE,
        ..spec("hide_comment", "Hide Comment", "hide_comment.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("parent_issue_number", PositiveInteger),
            FieldSpec::required("sub_issue_number", PositiveInteger),
        ],
        constraints: &[Constraint::Distinct(
            "parent_issue_number",
            "sub_issue_number",
        )],
        permissions: ISSUE_WRITE,
        ..spec("link_sub_issue", "Link Sub-Issue", "link_sub_issue.cjs")
    },
    TypeSpec {
        fields: &[FieldSpec::required("body", Text)],
        permissions: ISSUE_WRITE,
        outputs: &["task_number", "task_url"],
        needs_custom_token: true,
        ..spec(
            "create_agent_task",
            "Create Agent Task",
            "create_agent_task.cjs",
        )
    },
    TypeSpec {
        fields: &[FieldSpec::required("path", Text)],
        permissions: &[("contents", Write)],
        outputs: &["published_count", "branch_name"],
        ..spec("upload_asset", "Upload Assets", "upload_assets.cjs")
    },
    TypeSpec {
        fields: &[
            FieldSpec::required("tool", Text),
            FieldSpec::required("reason", Text),
            FieldSpec::optional("alternatives", Text),
            FieldSpec::defaulted("timestamp", Text, FieldDefault::Timestamp),
        ],
        outputs: &["tools_reported", "total_count"],
        ..spec("missing_tool", "Record Missing Tool", "missing_tool.cjs")
    },
    TypeSpec {
        fields: &[FieldSpec::required("message", Text)],
        outputs: &["noop_message"],
        ..spec("noop", "Process No-Op Messages", "noop.cjs")
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn lookup_accepts_dash_and_underscore_forms() {
        assert_eq!(lookup("create-issue").map(|spec| spec.name), Some("create_issue"));
        assert_eq!(lookup("Create_Issue").map(|spec| spec.name), Some("create_issue"));
        assert!(lookup("launch-missiles").is_none());
    }

    #[test]
    fn type_names_and_scripts_are_unique() {
        let names: HashSet<_> = BUILTIN_TYPES.iter().map(|spec| spec.name).collect();
        let scripts: HashSet<_> = BUILTIN_TYPES.iter().map(|spec| spec.script).collect();
        assert_eq!(names.len(), BUILTIN_TYPES.len());
        assert_eq!(scripts.len(), BUILTIN_TYPES.len());
    }

    #[test]
    fn constraints_reference_declared_fields() {
        for spec in BUILTIN_TYPES {
            for constraint in spec.constraints {
                let referenced: Vec<&str> = match constraint {
                    Constraint::LessOrEqual(a, b) | Constraint::Distinct(a, b) => vec![*a, *b],
                    Constraint::AtLeastOneOf(fields) => fields.to_vec(),
                    Constraint::NonEmpty(field) => vec![*field],
                };
                for field in referenced {
                    assert!(spec.field(field).is_some(), "{}: {field}", spec.name);
                }
            }
        }
    }

    #[test]
    fn config_key_uses_dashes() {
        let spec = lookup("create_pull_request_review_comment").unwrap();
        assert_eq!(spec.config_key(), "create-pull-request-review-comment");
    }
}
