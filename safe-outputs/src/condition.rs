//! Boolean expression tree for job and step `if:` conditions, rendered into
//! the platform's `${{ }}` expression syntax.

use std::fmt;

use serde::Serialize;
use serde::Serializer;

pub const AGENT_JOB: &str = "agent";
pub const DETECTION_JOB: &str = "detection";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Pre-rendered expression text, emitted verbatim.
    Expression(String),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Parentheses(Box<Condition>),
    /// Flat `a || b || c`, avoiding the nesting of chained [`Condition::Or`].
    Disjunction(Vec<Condition>),
    FunctionCall {
        name: String,
        args: Vec<Condition>,
    },
    PropertyAccess(String),
    StringLiteral(String),
    BooleanLiteral(bool),
    NumberLiteral(String),
    Comparison {
        left: Box<Condition>,
        op: Comparator,
        right: Box<Condition>,
    },
    Ternary {
        condition: Box<Condition>,
        then: Box<Condition>,
        otherwise: Box<Condition>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn as_str(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Condition) -> Condition {
        Condition::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    pub fn parenthesized(self) -> Condition {
        Condition::Parentheses(Box::new(self))
    }

    pub fn call(name: impl Into<String>, args: Vec<Condition>) -> Condition {
        Condition::FunctionCall {
            name: name.into(),
            args,
        }
    }

    pub fn property(path: impl Into<String>) -> Condition {
        Condition::PropertyAccess(path.into())
    }

    pub fn string(value: impl Into<String>) -> Condition {
        Condition::StringLiteral(value.into())
    }

    pub fn compare(left: Condition, op: Comparator, right: Condition) -> Condition {
        Condition::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn ternary(condition: Condition, then: Condition, otherwise: Condition) -> Condition {
        Condition::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// `contains(haystack, 'needle')`.
    pub fn contains(haystack: Condition, needle: impl Into<String>) -> Condition {
        Condition::call("contains", vec![haystack, Condition::string(needle)])
    }

    /// `None` for an empty list; a single term is returned unchanged.
    pub fn any(mut terms: Vec<Condition>) -> Option<Condition> {
        match terms.len() {
            0 => None,
            1 => terms.pop(),
            _ => Some(Condition::Disjunction(terms)),
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Expression(expr) => f.write_str(expr),
            Condition::And(left, right) => write!(f, "({left}) && ({right})"),
            Condition::Or(left, right) => write!(f, "({left}) || ({right})"),
            // `!(cancelled())` would be read as an object literal.
            Condition::Not(child) if matches!(**child, Condition::FunctionCall { .. }) => {
                write!(f, "!{child}")
            }
            Condition::Not(child) => write!(f, "!({child})"),
            Condition::Parentheses(child) => write!(f, "({child})"),
            Condition::Disjunction(terms) => write_joined(f, terms, " || "),
            Condition::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                write_joined(f, args, ", ")?;
                f.write_str(")")
            }
            Condition::PropertyAccess(path) => f.write_str(path),
            Condition::StringLiteral(value) => write!(f, "'{}'", value.replace('\'', "''")),
            Condition::BooleanLiteral(value) => write!(f, "{value}"),
            Condition::NumberLiteral(value) => f.write_str(value),
            Condition::Comparison { left, op, right } => {
                write!(f, "{left} {} {right}", op.as_str())
            }
            // The platform has no `?:`; `a && b || c` is its idiom.
            Condition::Ternary {
                condition,
                then,
                otherwise,
            } => write!(f, "{condition} && {then} || {otherwise}"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Condition], sep: &str) -> fmt::Result {
    for (idx, term) in terms.iter().enumerate() {
        if idx > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{term}")?;
    }
    Ok(())
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// `!cancelled() && needs.<agent>.result != 'skipped'`: the dispatch job
/// still runs after agent failures but not after cancellation.
pub fn agent_completed(agent_job: &str) -> Condition {
    Condition::call("cancelled", Vec::new()).negate().and(Condition::compare(
        Condition::property(format!("needs.{agent_job}.result")),
        Comparator::Ne,
        Condition::string("skipped"),
    ))
}

/// Gate for the dispatch job of `output_type`.
///
/// With `min > 0` the job must run even without items so that it can
/// enforce the minimum, and the membership test is dropped.
pub fn safe_output_type(agent_job: &str, output_type: &str, min: usize) -> Condition {
    let base = agent_completed(agent_job);
    if min > 0 {
        return base.parenthesized();
    }
    base.and(Condition::contains(
        Condition::property(format!("needs.{agent_job}.outputs.output_types")),
        format!(",{output_type},"),
    ))
}

/// `needs.detection.outputs.success == 'true'`.
pub fn detection_succeeded() -> Condition {
    Condition::compare(
        Condition::property(format!("needs.{DETECTION_JOB}.outputs.success")),
        Comparator::Eq,
        Condition::string("true"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn safe_output_gate_renders_like_the_platform_expects() {
        assert_eq!(
            safe_output_type(AGENT_JOB, "create_issue", 0).render(),
            "((!cancelled()) && (needs.agent.result != 'skipped')) && (contains(needs.agent.outputs.output_types, ',create_issue,'))"
        );
        assert_eq!(
            safe_output_type(AGENT_JOB, "create_issue", 1).render(),
            "((!cancelled()) && (needs.agent.result != 'skipped'))"
        );
    }

    #[test]
    fn not_wraps_non_calls_in_parentheses() {
        let cond = Condition::property("github.event.pull_request.draft").negate();
        assert_eq!(cond.render(), "!(github.event.pull_request.draft)");
    }

    #[test]
    fn disjunction_and_literals_render_flat() {
        let cond = Condition::any(vec![
            Condition::compare(
                Condition::property("github.event_name"),
                Comparator::Eq,
                Condition::string("issues"),
            ),
            Condition::BooleanLiteral(false),
            Condition::NumberLiteral("3".to_string()),
        ])
        .unwrap();
        assert_eq!(cond.render(), "github.event_name == 'issues' || false || 3");
        assert_eq!(Condition::string("it's").render(), "'it''s'");
        assert_eq!(Condition::any(Vec::new()), None);
    }

    #[test]
    fn ternary_uses_and_or_idiom() {
        let cond = Condition::ternary(
            Condition::property("inputs.staged"),
            Condition::string("preview"),
            Condition::string("live"),
        );
        assert_eq!(cond.render(), "inputs.staged && 'preview' || 'live'");
    }
}
