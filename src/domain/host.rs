//! Host patterns and canonical host keys.
//!
//! Raw page hosts are matched against a small, closed set of pattern kinds.
//! Keeping the set closed (exact host, suffix wildcard, builtin pseudo-host
//! group) keeps matching deterministic and testable, as opposed to open-ended
//! string matching.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pseudo-hosts the activity tracker reports for files opened directly in the
/// browser (there is no real hostname to attribute the time to).
pub const LOCAL_FILE_HOSTS: &[&str] = &[
    "local-file.pdf",
    "local-file.json",
    "local-file.txt",
    "local-file.img",
];

/// Canonical host all local-file pseudo-hosts merge into.
pub const MERGED_LOCAL_HOST: &str = "local-files";

/// A normalized host key used for all aggregation and rule matching.
///
/// Canonical hosts are produced by merge-rule resolution (see
/// [`crate::application::normalizer::HostNormalizer`]). Normalization is
/// idempotent: normalizing an already-canonical host returns itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalHost(String);

impl CanonicalHost {
    /// Create a canonical host key. Hostnames are case-insensitive, so the
    /// key is lowercased on construction.
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into().to_ascii_lowercase())
    }

    /// The host as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CanonicalHost {
    fn from(host: &str) -> Self {
        Self::new(host)
    }
}

/// Builtin pseudo-host groups.
///
/// Groups cover hosts that are pre-declared constants rather than real
/// domains. Each group maps a fixed set of pseudo-hosts to one merged host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostGroup {
    /// Files opened directly in the browser (PDF, JSON, text, images).
    LocalFiles,
}

impl HostGroup {
    /// Whether `raw` is one of this group's pseudo-hosts.
    pub fn contains(&self, raw: &str) -> bool {
        match self {
            HostGroup::LocalFiles => LOCAL_FILE_HOSTS.iter().any(|h| raw.eq_ignore_ascii_case(h)),
        }
    }

    /// The canonical host this group's members merge into.
    pub fn merged_host(&self) -> CanonicalHost {
        match self {
            HostGroup::LocalFiles => CanonicalHost::new(MERGED_LOCAL_HOST),
        }
    }
}

/// Error returned when a pattern string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string was empty.
    Empty,
    /// A `*` appeared anywhere other than a leading `*.` label.
    EmbeddedWildcard(String),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::Empty => write!(f, "host pattern must not be empty"),
            PatternError::EmbeddedWildcard(p) => {
                write!(f, "wildcard is only allowed as a leading `*.` label: {p}")
            }
        }
    }
}

impl std::error::Error for PatternError {}

/// A pattern over hostnames.
///
/// The variant set is closed by design (see module docs). Matching is
/// case-insensitive; patterns are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostPattern {
    /// Matches exactly one host.
    Exact(String),
    /// Matches a host and all of its strict subdomains.
    ///
    /// Written `*.example.com` in user-facing form; matches `example.com`,
    /// `video.example.com`, `a.b.example.com`, ...
    Suffix(String),
    /// Matches a builtin pseudo-host group.
    Group(HostGroup),
}

impl HostPattern {
    /// Parse a user-supplied pattern string.
    ///
    /// - `*.example.com` becomes [`HostPattern::Suffix`]
    /// - anything else without a `*` becomes [`HostPattern::Exact`]
    ///
    /// # Errors
    /// Returns `PatternError` for empty patterns or misplaced wildcards.
    /// Malformed patterns are rejected here, at configuration write time, and
    /// never reach the evaluator.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if let Some(suffix) = pattern.strip_prefix("*.") {
            if suffix.is_empty() {
                return Err(PatternError::Empty);
            }
            if suffix.contains('*') {
                return Err(PatternError::EmbeddedWildcard(pattern.clone()));
            }
            return Ok(HostPattern::Suffix(suffix.to_string()));
        }
        if pattern.contains('*') {
            return Err(PatternError::EmbeddedWildcard(pattern));
        }
        Ok(HostPattern::Exact(pattern))
    }

    /// Whether `raw` matches this pattern.
    pub fn matches(&self, raw: &str) -> bool {
        let raw = raw.to_ascii_lowercase();
        match self {
            HostPattern::Exact(host) => raw == *host,
            HostPattern::Suffix(suffix) => {
                raw == *suffix || raw.strip_suffix(suffix.as_str()).is_some_and(|p| p.ends_with('.'))
            }
            HostPattern::Group(group) => group.contains(&raw),
        }
    }

    /// A specificity score used by the most-specific match policy.
    ///
    /// Longer origins win; an exact pattern beats a suffix pattern of the
    /// same length. Groups sit below any explicit hostname.
    pub fn specificity(&self) -> usize {
        match self {
            HostPattern::Exact(host) => host.len() * 2 + 1,
            HostPattern::Suffix(suffix) => suffix.len() * 2,
            HostPattern::Group(_) => 0,
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPattern::Exact(host) => f.write_str(host),
            HostPattern::Suffix(suffix) => write!(f, "*.{suffix}"),
            HostPattern::Group(HostGroup::LocalFiles) => f.write_str("<local files>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_matches_only_itself() {
        let pattern = HostPattern::parse("example.com").unwrap();
        assert_eq!(pattern, HostPattern::Exact("example.com".into()));

        assert!(pattern.matches("example.com"));
        assert!(pattern.matches("EXAMPLE.com"));
        assert!(!pattern.matches("video.example.com"));
        assert!(!pattern.matches("notexample.com"));
    }

    #[test]
    fn test_suffix_matches_host_and_subdomains() {
        let pattern = HostPattern::parse("*.example.com").unwrap();

        assert!(pattern.matches("example.com"));
        assert!(pattern.matches("video.example.com"));
        assert!(pattern.matches("a.b.example.com"));
        // Not a label boundary
        assert!(!pattern.matches("notexample.com"));
        assert!(!pattern.matches("example.com.evil.org"));
    }

    #[test]
    fn test_group_matches_pseudo_hosts() {
        let pattern = HostPattern::Group(HostGroup::LocalFiles);

        assert!(pattern.matches("local-file.pdf"));
        assert!(pattern.matches("local-file.json"));
        assert!(!pattern.matches("example.com"));
    }

    #[test]
    fn test_parse_rejects_malformed_patterns() {
        assert_eq!(HostPattern::parse(""), Err(PatternError::Empty));
        assert_eq!(HostPattern::parse("  "), Err(PatternError::Empty));
        assert_eq!(HostPattern::parse("*."), Err(PatternError::Empty));
        assert!(matches!(
            HostPattern::parse("exa*mple.com"),
            Err(PatternError::EmbeddedWildcard(_))
        ));
        assert!(matches!(
            HostPattern::parse("*.exa*mple.com"),
            Err(PatternError::EmbeddedWildcard(_))
        ));
    }

    #[test]
    fn test_canonical_host_lowercases() {
        assert_eq!(CanonicalHost::new("Example.COM").as_str(), "example.com");
    }

    #[test]
    fn test_specificity_ordering() {
        let exact = HostPattern::Exact("video.example.com".into());
        let suffix = HostPattern::Suffix("example.com".into());
        let group = HostPattern::Group(HostGroup::LocalFiles);

        assert!(exact.specificity() > suffix.specificity());
        assert!(suffix.specificity() > group.specificity());
    }
}
