use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use url::Url;

use crate::error::SafeOutputsError;
use crate::error::SafeOutputsResult;

/// Domains that are always reachable from agent-authored text.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "github.com",
    "github.io",
    "githubusercontent.com",
    "githubassets.com",
    "github.dev",
    "codespaces.new",
];

pub const DEFAULT_MAX_LINES: usize = 65_000;
pub const DEFAULT_MAX_BYTES: usize = 524_288;

/// Inputs that shape a sanitizer pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizePolicy {
    allowed_domains: Vec<String>,
    command: Option<String>,
    max_lines: usize,
    max_bytes: usize,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|domain| (*domain).to_string())
                .collect(),
            command: None,
            max_lines: DEFAULT_MAX_LINES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl SanitizePolicy {
    /// A policy that allows nothing but the given domains.
    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self {
            allowed_domains: Vec::new(),
            ..Self::default()
        };
        policy.extend_domains(domains);
        policy
    }

    pub fn extend_domains<I, S>(&mut self, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for domain in domains {
            let normalized = domain.as_ref().trim().to_ascii_lowercase();
            if normalized.is_empty() || self.allowed_domains.contains(&normalized) {
                continue;
            }
            self.allowed_domains.push(normalized);
        }
    }

    /// Adds the hosts of the platform's server and API URLs (for example a
    /// GitHub Enterprise instance) to the allow-list.
    pub fn with_platform_urls<'a>(mut self, urls: impl IntoIterator<Item = &'a str>) -> Self {
        let hosts: Vec<String> = urls
            .into_iter()
            .filter_map(|raw| Url::parse(raw.trim()).ok())
            .filter_map(|url| url.host_str().map(str::to_ascii_lowercase))
            .collect();
        self.extend_domains(hosts);
        self
    }

    pub fn with_command(mut self, command: impl Into<Option<String>>) -> Self {
        self.command = command
            .into()
            .map(|name| name.trim().trim_start_matches('/').to_string())
            .filter(|name| !name.is_empty());
        self
    }

    pub fn with_limits(mut self, max_lines: usize, max_bytes: usize) -> Self {
        self.max_lines = max_lines.max(1);
        self.max_bytes = max_bytes.max(64);
        self
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Exact match or subdomain of an allowed entry. `*.example.com` entries
    /// cover `example.com` itself as well.
    pub fn is_domain_allowed(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.allowed_domains.iter().any(|allowed| {
            let base = allowed.strip_prefix("*.").unwrap_or(allowed);
            host == base
                || host
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

/// Hosts and schemes the sanitizer replaced during one run, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactedDomainLog {
    entries: IndexSet<String>,
}

impl RedactedDomainLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: impl Into<String>) {
        self.entries.insert(entry.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Writes one entry per line. Nothing is written when the log is empty.
    pub fn write_to(&self, path: &Path) -> SafeOutputsResult<bool> {
        if self.entries.is_empty() {
            return Ok(false);
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|err| SafeOutputsError::io(parent, err))?;
        }
        let mut contents = String::new();
        for entry in &self.entries {
            contents.push_str(entry);
            contents.push('\n');
        }
        fs::write(path, contents).map_err(|err| SafeOutputsError::io(path, err))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn subdomains_and_wildcards_are_allowed() {
        let policy = SanitizePolicy::with_domains(["github.com", "*.example.org"]);
        assert!(policy.is_domain_allowed("github.com"));
        assert!(policy.is_domain_allowed("api.github.com"));
        assert!(policy.is_domain_allowed("docs.example.org"));
        assert!(policy.is_domain_allowed("example.org"));
        assert!(!policy.is_domain_allowed("evilgithub.com"));
        assert!(!policy.is_domain_allowed("github.com.evil.test"));
    }

    #[test]
    fn platform_urls_extend_allow_list() {
        let policy = SanitizePolicy::with_domains(Vec::<String>::new())
            .with_platform_urls(["https://ghe.corp.test", "https://api.ghe.corp.test/v3"]);
        assert_eq!(
            policy.allowed_domains(),
            &["ghe.corp.test".to_string(), "api.ghe.corp.test".to_string()]
        );
    }

    #[test]
    fn redacted_log_skips_empty_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/redacted.log");
        let mut log = RedactedDomainLog::new();
        assert!(!log.write_to(&path).unwrap());
        assert!(!path.exists());

        log.record("evil.test");
        log.record("ftp");
        log.record("evil.test");
        assert!(log.write_to(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "evil.test\nftp\n");
    }
}
