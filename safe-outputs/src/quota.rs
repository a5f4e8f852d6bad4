use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// How many items of one type a single batch may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Quota {
    Unbounded,
    Max(usize),
}

impl Quota {
    /// Applies a hard cap on top of the configured quota.
    pub fn capped(self, cap: Option<usize>) -> Self {
        match (self, cap) {
            (quota, None) => quota,
            (Quota::Unbounded, Some(cap)) => Quota::Max(cap),
            (Quota::Max(max), Some(cap)) => Quota::Max(max.min(cap)),
        }
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quota::Unbounded => f.write_str("unbounded"),
            Quota::Max(max) => write!(f, "{max}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Too many items of type '{output_type}'. Maximum allowed: {max}")]
pub struct QuotaExceeded {
    pub output_type: String,
    pub max: usize,
}

/// Running per-type counters for one collection pass.
///
/// Counts only ever grow, so once a type is full every later item of that
/// type is rejected regardless of what comes after it.
#[derive(Debug, Clone, Default)]
pub struct QuotaEnforcer {
    quotas: BTreeMap<String, Quota>,
    counts: BTreeMap<String, usize>,
}

impl QuotaEnforcer {
    pub fn new(quotas: BTreeMap<String, Quota>) -> Self {
        Self {
            quotas,
            counts: BTreeMap::new(),
        }
    }

    pub fn quota(&self, output_type: &str) -> Quota {
        self.quotas
            .get(output_type)
            .copied()
            .unwrap_or(Quota::Unbounded)
    }

    /// Counts the item when there is room for it.
    pub fn admit(&mut self, output_type: &str) -> Result<(), QuotaExceeded> {
        let quota = self.quota(output_type);
        let count = self.counts.entry(output_type.to_string()).or_default();
        if let Quota::Max(max) = quota
            && *count >= max
        {
            return Err(QuotaExceeded {
                output_type: output_type.to_string(),
                max,
            });
        }
        *count += 1;
        Ok(())
    }

    pub fn counts(&self) -> &BTreeMap<String, usize> {
        &self.counts
    }

    pub fn into_counts(self) -> BTreeMap<String, usize> {
        self.counts
    }
}
