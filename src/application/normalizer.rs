//! Stateful host normalizer: the configured merge-rule set.
//!
//! Wraps the pure resolution in [`crate::domain::merge`] with the mutable,
//! shareable rule list that configuration updates edit. Normalization itself
//! is side-effect-free; persistence of rule changes is the caller's
//! responsibility (see [`HostNormalizer::hydrate`] / [`HostNormalizer::persist_rule`]).

use crate::application::ports::{ConfigStore, StorageError};
use crate::domain::host::{CanonicalHost, HostPattern};
use crate::domain::merge::{self, MatchPolicy, MergeRule};
use std::sync::RwLock;

/// Maps raw page hosts to canonical aggregation keys using an ordered set of
/// merge rules.
#[derive(Debug, Default)]
pub struct HostNormalizer {
    rules: RwLock<Vec<MergeRule>>,
    policy: MatchPolicy,
}

impl HostNormalizer {
    /// Create a normalizer with no rules and the default first-match policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a normalizer with an explicit tie-break policy.
    pub fn with_policy(policy: MatchPolicy) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            policy,
        }
    }

    /// The configured tie-break policy.
    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Map a raw host to its canonical aggregation key.
    ///
    /// Never fails: unmatched, empty, or malformed hosts come back unchanged.
    /// Idempotent: normalizing an already-canonical host returns itself.
    pub fn normalize(&self, raw_host: &str) -> CanonicalHost {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        merge::resolve(&rules, self.policy, raw_host)
    }

    /// Register a rule at the end of the list.
    ///
    /// Two rules with the same origin are not silently ambiguous: the
    /// last-registered rule wins, the earlier one is removed.
    pub fn add_rule(&self, rule: MergeRule) {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        rules.retain(|existing| existing.origin != rule.origin);
        rules.push(rule);
    }

    /// Remove every rule with the given origin. Returns how many were removed.
    pub fn remove_origin(&self, origin: &HostPattern) -> usize {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        let before = rules.len();
        rules.retain(|rule| rule.origin != *origin);
        before - rules.len()
    }

    /// Replace the whole rule list, preserving the given order.
    pub fn set_rules(&self, rules: Vec<MergeRule>) {
        *self.rules.write().unwrap_or_else(|e| e.into_inner()) = rules;
    }

    /// Snapshot of the current rule list, in priority order.
    pub fn rules(&self) -> Vec<MergeRule> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Load the rule list from a config store, replacing current rules.
    ///
    /// # Errors
    /// Returns `StorageError` when the store is unavailable; the current
    /// rules are left untouched in that case.
    pub async fn hydrate(&self, store: &dyn ConfigStore) -> Result<(), StorageError> {
        let rules = store.load_merge_rules().await?;
        self.set_rules(rules);
        Ok(())
    }

    /// Register a rule and persist it.
    ///
    /// # Errors
    /// Returns `StorageError` when the store is unavailable. The rule is
    /// still registered in-process (read-after-write consistency), only the
    /// persisted copy is missing.
    pub async fn persist_rule(
        &self,
        store: &dyn ConfigStore,
        rule: MergeRule,
    ) -> Result<(), StorageError> {
        self.add_rule(rule.clone());
        store.save_merge_rule(&rule).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::HostPattern;

    fn rule(origin: &str, merged: &str) -> MergeRule {
        MergeRule::new(HostPattern::parse(origin).unwrap(), CanonicalHost::new(merged))
    }

    #[test]
    fn test_normalize_without_rules_is_identity() {
        let normalizer = HostNormalizer::new();
        assert_eq!(
            normalizer.normalize("example.com"),
            CanonicalHost::new("example.com")
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = HostNormalizer::new();
        normalizer.add_rule(rule("*.example.com", "example.com"));
        normalizer.add_rule(rule("local-file.pdf", "local-files"));

        for raw in ["video.example.com", "example.com", "other.org", ""] {
            let once = normalizer.normalize(raw);
            let twice = normalizer.normalize(once.as_str());
            assert_eq!(once, twice, "normalize must be idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_duplicate_origin_last_registered_wins() {
        let normalizer = HostNormalizer::new();
        normalizer.add_rule(rule("video.example.com", "example.com"));
        normalizer.add_rule(rule("video.example.com", "video-sites"));

        assert_eq!(
            normalizer.normalize("video.example.com"),
            CanonicalHost::new("video-sites")
        );
        assert_eq!(normalizer.rules().len(), 1);
    }

    #[test]
    fn test_remove_origin() {
        let normalizer = HostNormalizer::new();
        normalizer.add_rule(rule("video.example.com", "example.com"));

        let origin = HostPattern::parse("video.example.com").unwrap();
        assert_eq!(normalizer.remove_origin(&origin), 1);
        assert_eq!(
            normalizer.normalize("video.example.com"),
            CanonicalHost::new("video.example.com")
        );
    }
}
