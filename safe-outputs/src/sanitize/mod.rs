//! Text sanitizer applied to every string an agent hands to the platform.
//!
//! [`Sanitizer::sanitize`] runs a fixed sequence of neutralizing rewrites:
//!
//! 1. strip ANSI escapes and control characters (newline, tab and carriage
//!    return survive)
//! 2. wrap a leading `/command` trigger in backticks
//! 3. wrap every `@mention` in backticks
//! 4. drop XML/HTML comments
//! 5. parenthesize tags outside the formatting allow-list, CDATA included
//! 6. redact URIs with a non-HTTPS scheme
//! 7. redact HTTPS URLs whose host is not allow-listed
//! 8. truncate to the line ceiling, then to the byte ceiling
//! 9. wrap `fixes #N` style bot triggers in backticks
//! 10. trim surrounding whitespace
//!
//! The function is total and idempotent.

mod markup;
mod neutralize;
mod policy;
mod urls;

use once_cell::sync::Lazy;
use regex::Regex;

use self::markup::neutralize_tags;
use self::markup::remove_comments;
use self::neutralize::CommandTrigger;
use self::neutralize::neutralize_bot_triggers;
use self::neutralize::neutralize_mentions;
use self::urls::redact_disallowed_hosts;
use self::urls::redact_insecure_schemes;

pub use self::policy::DEFAULT_ALLOWED_DOMAINS;
pub use self::policy::DEFAULT_MAX_BYTES;
pub use self::policy::DEFAULT_MAX_LINES;
pub use self::policy::RedactedDomainLog;
pub use self::policy::SanitizePolicy;
pub use self::urls::REDACTED;

pub const LINES_TRUNCATED_MARKER: &str = "\n[Content truncated due to line count]";
pub const BYTES_TRUNCATED_MARKER: &str = "\n[Content truncated due to length]";

/// Upper bound on repeated passes; real inputs settle after the second.
const MAX_PASSES: usize = 4;

static ANSI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-Z\\-_])")
        .expect("compiled ansi regex")
});

static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("compiled control regex"));

#[derive(Debug, Clone)]
pub struct Sanitizer {
    policy: SanitizePolicy,
    command: Option<CommandTrigger>,
}

impl Sanitizer {
    pub fn new(policy: SanitizePolicy) -> Self {
        let command = policy.command().and_then(CommandTrigger::new);
        Self { policy, command }
    }

    pub fn policy(&self) -> &SanitizePolicy {
        &self.policy
    }

    /// Sanitizes `text`, recording every redacted host or scheme in `log`.
    ///
    /// Neutralizing one construct can expose another (a comment removed from
    /// between `@` and a name, a tag split by another tag), so the pass is
    /// repeated until the output stops changing.
    pub fn sanitize(&self, text: &str, log: &mut RedactedDomainLog) -> String {
        let mut current = self.apply(text, log);
        for _ in 1..MAX_PASSES {
            let next = self.apply(&current, log);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn apply(&self, text: &str, log: &mut RedactedDomainLog) -> String {
        let text = strip_control(text);
        let text = match &self.command {
            Some(trigger) => trigger.neutralize(&text),
            None => text,
        };
        let text = neutralize_mentions(&text);
        let text = remove_comments(&text);
        let text = neutralize_tags(&text);
        let text = redact_insecure_schemes(&text, log);
        let text = redact_disallowed_hosts(&text, &self.policy, log);
        let text = truncate(&text, self.policy.max_lines(), self.policy.max_bytes());
        let text = neutralize_bot_triggers(&text);
        text.trim().to_string()
    }
}

/// Convenience wrapper for callers that do not need the redaction log.
pub fn sanitize(text: &str, policy: &SanitizePolicy) -> String {
    let mut log = RedactedDomainLog::new();
    Sanitizer::new(policy.clone()).sanitize(text, &mut log)
}

fn strip_control(text: &str) -> String {
    let text = ANSI_RE.replace_all(text, "");
    CONTROL_RE.replace_all(&text, "").into_owned()
}

fn truncate(text: &str, max_lines: usize, max_bytes: usize) -> String {
    let mut out = match text.match_indices('\n').nth(max_lines.saturating_sub(1)) {
        Some((newline, _)) => format!("{}{LINES_TRUNCATED_MARKER}", &text[..newline]),
        None => text.to_string(),
    };
    if out.len() > max_bytes {
        let cut = cut_point(&out, max_bytes.saturating_sub(BYTES_TRUNCATED_MARKER.len()));
        out.truncate(cut);
        out.push_str(BYTES_TRUNCATED_MARKER);
    }
    out
}

/// Largest char boundary within `budget` that does not split a
/// whitespace-delimited token, so no half URL or half mention survives.
fn cut_point(text: &str, budget: usize) -> usize {
    let mut cut = budget.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let splits_token = text[cut..]
        .chars()
        .next()
        .is_some_and(|next| !next.is_whitespace());
    if splits_token && let Some(space) = text[..cut].rfind(char::is_whitespace) {
        cut = space;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn policy() -> SanitizePolicy {
        SanitizePolicy::default()
    }

    #[test]
    fn strips_ansi_and_control_characters() {
        assert_eq!(
            sanitize("\x1b[31mred\x1b[0m\x07 bell\ttab\r\nnext", &policy()),
            "red bell\ttab\r\nnext"
        );
    }

    #[test]
    fn mentions_and_urls_are_neutralized() {
        let out = sanitize("Hello @octocat, see http://evil.test/a", &policy());
        assert_eq!(out, "Hello `@octocat`, see (redacted)");
    }

    #[test]
    fn comment_hiding_a_mention_is_caught() {
        let out = sanitize("ping @<!-- -->octocat", &policy());
        assert_eq!(out, "ping `@octocat`");
        assert_eq!(sanitize(&out, &policy()), out);
    }

    #[test]
    fn command_trigger_is_wrapped() {
        let policy = policy().with_command(Some("/deploy".to_string()));
        assert_eq!(sanitize("/deploy now", &policy), "`/deploy` now");
        assert_eq!(sanitize("run /deploy now", &policy), "run /deploy now");
    }

    #[test]
    fn line_ceiling_wins_over_byte_ceiling() {
        let policy = policy().with_limits(2, 10_000);
        let out = sanitize("one\ntwo\nthree\nfour", &policy);
        assert_eq!(out, "one\ntwo\n[Content truncated due to line count]");
        assert_eq!(sanitize(&out, &policy), out);
    }

    #[test]
    fn byte_ceiling_does_not_split_urls() {
        let policy = policy().with_limits(100, 64);
        let text = format!("{} https://github.com/owner/repo/issues/12345", "word ".repeat(5));
        let out = sanitize(&text, &policy);
        assert!(out.len() <= 64, "{out}");
        assert!(out.ends_with("[Content truncated due to length]"));
        assert!(!out.contains("https://gi"));
        assert_eq!(sanitize(&out, &policy), out);
    }

    #[test]
    fn cut_point_respects_char_boundaries() {
        let text = "ééééé";
        assert_eq!(cut_point(text, 3), 2);
    }
}
