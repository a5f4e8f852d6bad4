//! Line parser for the agent's JSONL stream with a best-effort repair pass
//! for the malformed JSON that language models tend to emit.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// A structurally valid record; `type` is checked later by the validator.
pub type RawRecord = Map<String, Value>;

const SNIPPET_CHARS: usize = 100;

static BARE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^\s*|[{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)(\s*:)").expect("compiled bare key regex")
});
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("compiled trailing comma regex"));
static OBJECT_BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*"[^"]*"\s*:"#).expect("compiled object body regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Line {line}: {message}: {snippet}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
    pub snippet: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>, text: &str) -> Self {
        let mut snippet: String = text.chars().take(SNIPPET_CHARS).collect();
        if text.chars().nth(SNIPPET_CHARS).is_some() {
            snippet.push_str("...");
        }
        Self {
            line,
            message: message.into(),
            snippet,
        }
    }
}

/// Parses one line, retrying once after [`repair`] when strict parsing fails.
pub fn parse_line(line: usize, text: &str) -> Result<RawRecord, ParseError> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(strict_err) => {
            let repaired = repair(text);
            debug!(line, error = %strict_err, repaired = %repaired, "retrying with repaired json");
            serde_json::from_str::<Value>(&repaired)
                .map_err(|_| ParseError::new(line, "JSON parsing failed", text))?
        }
    };
    match value {
        Value::Object(record) => Ok(record),
        _ => Err(ParseError::new(line, "expected a JSON object", text)),
    }
}

/// Applies the structural repairs in order:
///
/// 1. drop control characters other than newline, tab and carriage return
/// 2. rewrite single-quoted strings as double-quoted ones
/// 3. quote bare object keys
/// 4. drop trailing commas before `}` and `]`
/// 5. balance brackets and braces
///
/// Only one line is ever considered and an unterminated string is left
/// open, so a value broken across physical lines never parses. The result is
/// deterministic but is not guaranteed to be valid JSON.
pub fn repair(text: &str) -> String {
    let text: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect();
    let text = normalize_quotes(&text);
    let text: String = split_segments(&text)
        .into_iter()
        .map(|segment| match segment {
            Segment::Code(code) => {
                let code = BARE_KEY_RE.replace_all(code, "$1\"$2\"$3");
                TRAILING_COMMA_RE.replace_all(&code, "$1").into_owned()
            }
            Segment::Str(literal) => literal.to_string(),
        })
        .collect();
    balance(&text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Double,
    Single,
}

/// Converts `'...'` literals to `"..."`, escaping embedded double quotes and
/// raw whitespace controls that JSON strings cannot hold.
fn normalize_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars();
    let mut state = Quote::None;
    while let Some(c) = chars.next() {
        match (state, c) {
            (Quote::None, '"') => {
                out.push('"');
                state = Quote::Double;
            }
            (Quote::None, '\'') => {
                out.push('"');
                state = Quote::Single;
            }
            (Quote::None, _) => out.push(c),
            (Quote::Double, '\\') => {
                out.push('\\');
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            (Quote::Double, '"') | (Quote::Single, '\'') => {
                out.push('"');
                state = Quote::None;
            }
            (Quote::Single, '\\') => match chars.next() {
                Some('\'') => out.push('\''),
                Some(escaped) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => out.push('\\'),
            },
            (Quote::Single, '"') => out.push_str("\\\""),
            (_, '\n') => out.push_str("\\n"),
            (_, '\r') => out.push_str("\\r"),
            (_, '\t') => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Code(&'a str),
    /// A double-quoted literal including its quotes; may be unterminated.
    Str(&'a str),
}

fn split_segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                segments.push(Segment::Str(&text[start..=idx]));
                start = idx + 1;
                in_string = false;
            }
        } else if c == '"' {
            if start < idx {
                segments.push(Segment::Code(&text[start..idx]));
            }
            start = idx;
            in_string = true;
        }
    }
    if start < text.len() {
        let rest = &text[start..];
        segments.push(if in_string {
            Segment::Str(rest)
        } else {
            Segment::Code(rest)
        });
    }
    segments
}

fn balance(text: &str) -> String {
    let mut open: Vec<char> = Vec::new();
    let mut missing_openers: Vec<char> = Vec::new();
    let mut unterminated = false;
    for segment in split_segments(text) {
        match segment {
            Segment::Str(literal) => {
                unterminated = literal.len() < 2 || !closes_string(literal);
            }
            Segment::Code(code) => {
                for c in code.chars() {
                    match c {
                        '{' | '[' => open.push(c),
                        '}' | ']' => {
                            let opener = if c == '}' { '{' } else { '[' };
                            if open.last() == Some(&opener) {
                                open.pop();
                            } else {
                                missing_openers.push(opener);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // A dangling separator before the appended closers would undo step 4.
    let body = if open.is_empty() || unterminated {
        text
    } else {
        text.trim_end().trim_end_matches(',')
    };

    let mut out = String::with_capacity(text.len() + open.len() + missing_openers.len() + 2);
    out.extend(missing_openers.iter().rev());
    out.push_str(body);
    out.extend(open.iter().rev().map(|c| if *c == '{' { '}' } else { ']' }));

    if !out.starts_with(['{', '[']) && OBJECT_BODY_RE.is_match(&out) {
        out = format!("{{{out}}}");
    }
    out
}

/// True when the literal ends in a quote that is not itself escaped.
fn closes_string(literal: &str) -> bool {
    let Some(body) = literal.strip_suffix('"') else {
        return false;
    };
    let trailing_backslashes = body.chars().rev().take_while(|c| *c == '\\').count();
    trailing_backslashes % 2 == 0
}
