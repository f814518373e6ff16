//! Rule store: the configured set of limit rules.
//!
//! Mutations are driven by the external options UI; the store validates at
//! write time so malformed rules never reach the evaluator, and guarantees
//! read-after-write consistency for evaluation within the same process.

use crate::application::ports::{ConfigStore, StorageError};
use crate::domain::host::CanonicalHost;
use crate::domain::rule::{LimitRule, RuleError, RuleId};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

/// Holds every configured limit rule and answers which apply to a host.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: RwLock<Vec<LimitRule>>,
    next_id: AtomicU32,
}

impl RuleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Add a rule draft, assigning its id.
    ///
    /// # Errors
    /// Returns `RuleError` when validation fails; the store is unchanged.
    pub fn add(&self, mut rule: LimitRule) -> Result<RuleId, RuleError> {
        rule.validate()?;
        let id = RuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        rule.id = id;
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(rule);
        Ok(id)
    }

    /// Replace the rule with `rule.id`.
    ///
    /// # Errors
    /// Returns `RuleError` when validation fails or the id is unknown.
    pub fn update(&self, rule: LimitRule) -> Result<(), RuleError> {
        rule.validate()?;
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(slot) => {
                *slot = rule;
                Ok(())
            }
            None => Err(RuleError::UnknownRule(rule.id)),
        }
    }

    /// Remove a rule by id.
    ///
    /// # Errors
    /// Returns `RuleError::UnknownRule` when no such rule exists.
    pub fn remove(&self, id: RuleId) -> Result<(), RuleError> {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        if rules.len() == before {
            return Err(RuleError::UnknownRule(id));
        }
        Ok(())
    }

    /// Look up one rule by id.
    pub fn get(&self, id: RuleId) -> Option<LimitRule> {
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|rule| rule.id == id)
            .cloned()
    }

    /// Enabled rules whose pattern matches `host`, in registration order.
    ///
    /// All matches are returned: several rules may apply to one host
    /// simultaneously (e.g. both a visit and a daily rule).
    pub fn rules_for(&self, host: &CanonicalHost) -> Vec<LimitRule> {
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|rule| rule.enabled && rule.pattern.matches(host.as_str()))
            .cloned()
            .collect()
    }

    /// Every rule, for administration.
    pub fn all(&self) -> Vec<LimitRule> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Load rules from a config store, replacing current contents.
    ///
    /// The id counter continues after the highest loaded id.
    ///
    /// # Errors
    /// Returns `StorageError` when the store is unavailable; current rules
    /// are left untouched.
    pub async fn hydrate(&self, store: &dyn ConfigStore) -> Result<(), StorageError> {
        let loaded = store.load_rules().await?;
        let max_id = loaded.iter().map(|rule| rule.id.0).max().unwrap_or(0);
        self.next_id.store(max_id + 1, Ordering::Relaxed);
        *self.rules.write().unwrap_or_else(|e| e.into_inner()) = loaded;
        Ok(())
    }

    /// Persist one rule (by id) to a config store.
    ///
    /// Returns `Ok(false)` when the id is unknown.
    ///
    /// # Errors
    /// Returns `StorageError` when the store is unavailable.
    pub async fn persist(
        &self,
        store: &dyn ConfigStore,
        id: RuleId,
    ) -> Result<bool, StorageError> {
        match self.get(id) {
            Some(rule) => {
                store.save_rule(&rule).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::HostPattern;
    use crate::domain::rule::LimitKind;

    fn daily(pattern: &str, threshold: u64) -> LimitRule {
        LimitRule::draft(HostPattern::parse(pattern).unwrap(), LimitKind::Daily, threshold)
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let store = RuleStore::new();
        let a = store.add(daily("a.com", 100)).unwrap();
        let b = store.add(daily("b.com", 100)).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.all().len(), 2);
    }

    #[test]
    fn test_add_rejects_invalid_rules() {
        let store = RuleStore::new();
        assert_eq!(store.add(daily("a.com", 0)), Err(RuleError::ZeroThreshold));
        assert!(store.all().is_empty());
    }

    #[test]
    fn test_rules_for_returns_all_matches_in_order() {
        let store = RuleStore::new();
        let visit = LimitRule::draft(
            HostPattern::parse("*.example.com").unwrap(),
            LimitKind::Visit,
            10,
        );
        store.add(visit).unwrap();
        store.add(daily("example.com", 3600)).unwrap();
        store.add(daily("other.org", 3600)).unwrap();

        let matched = store.rules_for(&CanonicalHost::new("example.com"));
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].kind, LimitKind::Visit);
        assert_eq!(matched[1].kind, LimitKind::Daily);
    }

    #[test]
    fn test_rules_for_skips_disabled() {
        let store = RuleStore::new();
        store.add(daily("example.com", 3600).disabled()).unwrap();
        assert!(store.rules_for(&CanonicalHost::new("example.com")).is_empty());
    }

    #[test]
    fn test_update_is_read_after_write_consistent() {
        let store = RuleStore::new();
        let id = store.add(daily("example.com", 3600)).unwrap();

        let mut rule = store.get(id).unwrap();
        rule.threshold = 7200;
        store.update(rule).unwrap();

        assert_eq!(store.get(id).unwrap().threshold, 7200);
    }

    #[test]
    fn test_update_unknown_rule() {
        let store = RuleStore::new();
        let mut rule = daily("example.com", 3600);
        rule.id = RuleId(42);
        assert_eq!(store.update(rule), Err(RuleError::UnknownRule(RuleId(42))));
    }

    #[test]
    fn test_remove() {
        let store = RuleStore::new();
        let id = store.add(daily("example.com", 3600)).unwrap();
        store.remove(id).unwrap();
        assert!(store.get(id).is_none());
        assert_eq!(store.remove(id), Err(RuleError::UnknownRule(id)));
    }
}
