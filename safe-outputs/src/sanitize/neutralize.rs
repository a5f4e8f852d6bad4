//! Wraps trigger-shaped tokens in backticks so the platform renders them as
//! inert code spans instead of acting on them.

use once_cell::sync::Lazy;
use regex::Captures;
use regex::Regex;
use regex::RegexBuilder;

static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^\w`])@([A-Za-z0-9](?:[A-Za-z0-9-]{0,37}[A-Za-z0-9])?(?:/[A-Za-z0-9._-]+)?)")
        .expect("compiled mention regex")
});

static BOT_TRIGGER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(^|[^\w`])((?:fix|fixes|fixed|close|closes|closed|resolve|resolves|resolved)[ \t]+#\w+)",
    )
    .expect("compiled bot trigger regex")
});

/// Matcher for a leading `/command` token.
#[derive(Debug, Clone)]
pub(crate) struct CommandTrigger {
    pattern: Regex,
}

impl CommandTrigger {
    pub(crate) fn new(command: &str) -> Option<Self> {
        RegexBuilder::new(&format!(r"^(\s*)/({})\b", regex::escape(command)))
            .case_insensitive(true)
            .build()
            .ok()
            .map(|pattern| Self { pattern })
    }

    pub(crate) fn neutralize(&self, text: &str) -> String {
        self.pattern
            .replace(text, |caps: &Captures<'_>| format!("{}`/{}`", &caps[1], &caps[2]))
            .into_owned()
    }
}

/// `@user` and `@org/team` become `` `@user` `` and `` `@org/team` ``.
pub(crate) fn neutralize_mentions(text: &str) -> String {
    MENTION_RE
        .replace_all(text, |caps: &Captures<'_>| format!("{}`@{}`", &caps[1], &caps[2]))
        .into_owned()
}

/// `fixes #12` and friends would auto-close issues when merged.
pub(crate) fn neutralize_bot_triggers(text: &str) -> String {
    BOT_TRIGGER_RE
        .replace_all(text, |caps: &Captures<'_>| format!("{}`{}`", &caps[1], &caps[2]))
        .into_owned()
}
