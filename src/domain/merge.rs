//! Merge rules and their resolution semantics.
//!
//! A merge rule maps raw page hosts onto a single aggregation host, so that
//! e.g. `video.example.com` and `music.example.com` are accounted (and
//! limited) together as `example.com`. Resolution here is pure; the stateful,
//! configurable wrapper lives in
//! [`crate::application::normalizer::HostNormalizer`].

use crate::domain::host::{CanonicalHost, HostPattern};
use serde::{Deserialize, Serialize};

/// A mapping from a host pattern to the canonical host it merges into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRule {
    /// Pattern over raw hosts.
    pub origin: HostPattern,
    /// Aggregation key for everything the origin matches.
    pub merged: CanonicalHost,
}

impl MergeRule {
    /// Create a merge rule.
    pub fn new(origin: HostPattern, merged: impl Into<CanonicalHost>) -> Self {
        Self {
            origin,
            merged: merged.into(),
        }
    }
}

/// Tie-break policy when several merge rules match the same raw host.
///
/// The original system never exposed an explicit tie-break contract, so the
/// policy is configurable rather than hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPolicy {
    /// Rules are tried in registration order; the first match wins.
    #[default]
    FirstMatch,
    /// The match with the most specific origin wins (longest origin,
    /// exact over suffix); ties fall back to registration order.
    MostSpecific,
}

/// Resolve `raw` against an ordered rule list without chasing chains.
///
/// Returns the merged host of the winning rule, or `None` when no rule
/// matches.
pub fn resolve_once(rules: &[MergeRule], policy: MatchPolicy, raw: &str) -> Option<CanonicalHost> {
    match policy {
        MatchPolicy::FirstMatch => rules
            .iter()
            .find(|rule| rule.origin.matches(raw))
            .map(|rule| rule.merged.clone()),
        MatchPolicy::MostSpecific => rules
            .iter()
            .filter(|rule| rule.origin.matches(raw))
            .max_by_key(|rule| rule.origin.specificity())
            .map(|rule| rule.merged.clone()),
    }
}

/// Upper bound on merge-rule chain length before resolution gives up.
///
/// Chains (a rule whose merged host is itself another rule's origin) are
/// followed to a fixpoint so that normalization stays idempotent; the bound
/// breaks accidental cycles.
pub const MAX_RESOLVE_HOPS: usize = 8;

/// Resolve `raw` to its canonical aggregation host.
///
/// No match returns the input unchanged; empty or malformed hosts are
/// returned unchanged as well, so resolution never fails the caller. The
/// result is always a fixpoint of the rule set (up to [`MAX_RESOLVE_HOPS`]),
/// which makes normalization idempotent.
pub fn resolve(rules: &[MergeRule], policy: MatchPolicy, raw: &str) -> CanonicalHost {
    let mut current = CanonicalHost::new(raw);
    for _ in 0..MAX_RESOLVE_HOPS {
        match resolve_once(rules, policy, current.as_str()) {
            Some(next) if next != current => current = next,
            _ => return current,
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::HostGroup;

    fn rule(origin: &str, merged: &str) -> MergeRule {
        MergeRule::new(HostPattern::parse(origin).unwrap(), CanonicalHost::new(merged))
    }

    #[test]
    fn test_no_match_returns_input_unchanged() {
        let rules = vec![rule("example.com", "example.com")];

        assert_eq!(
            resolve(&rules, MatchPolicy::FirstMatch, "other.org"),
            CanonicalHost::new("other.org")
        );
        // Empty and malformed hosts pass through untouched
        assert_eq!(
            resolve(&rules, MatchPolicy::FirstMatch, ""),
            CanonicalHost::new("")
        );
        assert_eq!(
            resolve(&rules, MatchPolicy::FirstMatch, "not a host"),
            CanonicalHost::new("not a host")
        );
    }

    #[test]
    fn test_first_match_wins_in_registration_order() {
        let rules = vec![
            rule("*.example.com", "example.com"),
            rule("video.example.com", "video-sites"),
        ];

        assert_eq!(
            resolve(&rules, MatchPolicy::FirstMatch, "video.example.com"),
            CanonicalHost::new("example.com")
        );
    }

    #[test]
    fn test_most_specific_prefers_longer_origin() {
        let rules = vec![
            rule("*.example.com", "example.com"),
            rule("video.example.com", "video-sites"),
        ];

        assert_eq!(
            resolve(&rules, MatchPolicy::MostSpecific, "video.example.com"),
            CanonicalHost::new("video-sites")
        );
        // Hosts only the suffix matches still merge there
        assert_eq!(
            resolve(&rules, MatchPolicy::MostSpecific, "music.example.com"),
            CanonicalHost::new("example.com")
        );
    }

    #[test]
    fn test_resolution_follows_chains_to_fixpoint() {
        let rules = vec![
            rule("video.example.com", "example.com"),
            rule("example.com", "entertainment"),
        ];

        let resolved = resolve(&rules, MatchPolicy::FirstMatch, "video.example.com");
        assert_eq!(resolved, CanonicalHost::new("entertainment"));
        // Idempotence: resolving the result again is a no-op
        assert_eq!(
            resolve(&rules, MatchPolicy::FirstMatch, resolved.as_str()),
            resolved
        );
    }

    #[test]
    fn test_cycle_is_bounded() {
        let rules = vec![rule("a.com", "b.com"), rule("b.com", "a.com")];

        // Must terminate; the exact landing spot is unspecified but stable.
        let first = resolve(&rules, MatchPolicy::FirstMatch, "a.com");
        let second = resolve(&rules, MatchPolicy::FirstMatch, "a.com");
        assert_eq!(first, second);
    }

    #[test]
    fn test_group_rule_merges_pseudo_hosts() {
        let rules = vec![MergeRule::new(
            HostPattern::Group(HostGroup::LocalFiles),
            HostGroup::LocalFiles.merged_host(),
        )];

        assert_eq!(
            resolve(&rules, MatchPolicy::FirstMatch, "local-file.pdf"),
            CanonicalHost::new("local-files")
        );
    }
}
