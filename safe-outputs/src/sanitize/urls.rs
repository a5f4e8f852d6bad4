use once_cell::sync::Lazy;
use regex::Captures;
use regex::Regex;
use tracing::debug;
use url::Url;

use super::policy::RedactedDomainLog;
use super::policy::SanitizePolicy;

pub const REDACTED: &str = "(redacted)";

// A scheme glued to a letter or digit is part of a word. Markdown emphasis
// (`_`, `*`, `~`) still autolinks, so it counts as a boundary.

/// `scheme://...` for any scheme. HTTPS is let through here and judged by
/// [`redact_disallowed_hosts`].
static HIERARCHICAL_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(^|[^A-Za-z0-9/-])([A-Za-z][A-Za-z0-9+.-]*)://[^\s\])}'"<>&,;]*"#)
        .expect("compiled uri regex")
});

/// Schemes that carry a payload without `//`.
static OPAQUE_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(^|[^A-Za-z0-9/-])(javascript|vbscript|data|mailto|tel|sms|file|blob|about|news|ssh|git|ftp):[^\s\])}'"<>&,;]+"#,
    )
    .expect("compiled opaque uri regex")
});

static HTTPS_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(^|[^A-Za-z0-9/-])(https://[^\s\])}'"<>&,;]+)"#).expect("compiled https regex")
});

/// Replaces every URI whose scheme is not HTTPS with [`REDACTED`].
pub(crate) fn redact_insecure_schemes(text: &str, log: &mut RedactedDomainLog) -> String {
    let text = HIERARCHICAL_URI_RE.replace_all(text, |caps: &Captures<'_>| {
        let scheme = caps[2].to_ascii_lowercase();
        if scheme == "https" {
            return caps[0].to_string();
        }
        let uri = &caps[0][caps[1].len()..];
        let entry = host_of(uri).unwrap_or(scheme);
        debug!(entry = %entry, "redacting non-https uri");
        log.record(entry);
        format!("{}{REDACTED}", &caps[1])
    });
    OPAQUE_URI_RE
        .replace_all(&text, |caps: &Captures<'_>| {
            let scheme = caps[2].to_ascii_lowercase();
            debug!(scheme = %scheme, "redacting opaque uri");
            log.record(scheme);
            format!("{}{REDACTED}", &caps[1])
        })
        .into_owned()
}

/// Keeps HTTPS URLs whose host is allow-listed and redacts the rest.
pub(crate) fn redact_disallowed_hosts(
    text: &str,
    policy: &SanitizePolicy,
    log: &mut RedactedDomainLog,
) -> String {
    HTTPS_URL_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let url = &caps[2];
            match host_of(url) {
                Some(host) if policy.is_domain_allowed(&host) => caps[0].to_string(),
                Some(host) => {
                    debug!(host = %host, "redacting disallowed domain");
                    log.record(host);
                    format!("{}{REDACTED}", &caps[1])
                }
                None => {
                    let authority = raw_authority(url);
                    debug!(authority = %authority, "redacting unparseable url");
                    log.record(authority);
                    format!("{}{REDACTED}", &caps[1])
                }
            }
        })
        .into_owned()
}

fn host_of(uri: &str) -> Option<String> {
    Url::parse(uri)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .filter(|host| !host.is_empty())
}

fn raw_authority(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insecure_schemes_are_redacted_and_logged() {
        let mut log = RedactedDomainLog::new();
        let out = redact_insecure_schemes(
            "see http://evil.test/a, ftp://files.test and mailto:ops@evil.test",
            &mut log,
        );
        assert_eq!(out, "see (redacted), (redacted) and (redacted)");
        assert_eq!(
            log.iter().collect::<Vec<_>>(),
            vec!["evil.test", "files.test", "mailto"]
        );
    }

    #[test]
    fn https_is_left_for_the_host_check() {
        let mut log = RedactedDomainLog::new();
        let text = "https://evil.test/a";
        assert_eq!(redact_insecure_schemes(text, &mut log), text);
        assert!(log.is_empty());
    }

    #[test]
    fn prose_with_colons_is_untouched() {
        let mut log = RedactedDomainLog::new();
        let text = "Note: the data: field at 10:30 stays";
        assert_eq!(redact_insecure_schemes(text, &mut log), text);
    }

    #[test]
    fn hosts_outside_allow_list_are_redacted() {
        let policy = SanitizePolicy::with_domains(["github.com"]);
        let mut log = RedactedDomainLog::new();
        let out = redact_disallowed_hosts(
            "ok https://sub.github.com/x bad https://evil.example/x sneaky https://github.com@evil.example/",
            &policy,
            &mut log,
        );
        assert_eq!(out, "ok https://sub.github.com/x bad (redacted) sneaky (redacted)");
        assert!(log.contains("evil.example"));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn emphasis_markers_do_not_hide_urls() {
        let policy = SanitizePolicy::with_domains(["github.com"]);
        let mut log = RedactedDomainLog::new();
        let text = "_http://evil.test/x_ and *ftp://files.test/a*";
        let out = redact_insecure_schemes(text, &mut log);
        assert_eq!(out, "_(redacted) and *(redacted)");
        let out = redact_disallowed_hosts(
            "see _https://evil.example/steal?d=secret_ but ~https://github.com/ok~",
            &policy,
            &mut log,
        );
        assert_eq!(out, "see _(redacted) but ~https://github.com/ok~");
        assert_eq!(
            log.iter().collect::<Vec<_>>(),
            vec!["evil.test", "files.test", "evil.example"]
        );
    }
}
