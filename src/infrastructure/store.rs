//! In-memory document store.
//!
//! Stand-in for the extension's key-value storage area: documents are JSON
//! strings under string keys, and ledger deltas are merged additively with
//! replay deduplication, the semantics the real storage collaborator must
//! provide. Useful directly for single-process embedding and as the model
//! other adapters should follow.
//!
//! ## Document model
//!
//! - `ledger:{host}:{day}` - serialized [`LedgerEntry`]
//! - `rule:{id}` - serialized [`LimitRule`]
//! - `merge-rules` - serialized ordered `Vec<MergeRule>`
//!
//! Deltas are applied at most once per (producer, seq) pair; delivery may be
//! at-least-once (see the ledger's retry policy).

use crate::application::ports::{
    ConfigStore, LedgerDelta, LedgerEntry, LedgerStore, StorageError,
};
use crate::domain::merge::MergeRule;
use crate::domain::rule::LimitRule;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

/// Thread-safe in-memory document store implementing both persistence ports.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: DashMap<String, String>,
    /// (producer, seq) pairs of deltas already applied, for replay
    /// deduplication across contexts.
    applied: DashMap<(u64, u64), ()>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger_key(delta_host: &str, day: &crate::domain::period::CalendarDay) -> String {
        format!("ledger:{delta_host}:{day}")
    }

    fn decode<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::unavailable(format!("corrupt document: {e}")))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
        serde_json::to_string(value).map_err(|e| StorageError::unavailable(e.to_string()))
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn save_delta(&self, delta: &LedgerDelta) -> Result<(), StorageError> {
        // At-most-once application: a replayed delivery is a no-op.
        let dedup = (delta.producer, delta.seq);
        if self.applied.contains_key(&dedup) {
            warn!(producer = delta.producer, seq = delta.seq, "duplicate ledger delta ignored");
            return Ok(());
        }

        let key = Self::ledger_key(delta.host.as_str(), &delta.day);
        let mut entry = match self.documents.get(&key) {
            Some(raw) => Self::decode::<LedgerEntry>(&raw)?,
            None => LedgerEntry {
                host: delta.host.clone(),
                day: delta.day,
                focused_seconds: 0,
                visits: 0,
            },
        };
        entry.focused_seconds += delta.seconds;
        entry.visits += delta.visits;
        self.documents.insert(key, Self::encode(&entry)?);
        // A delta counts as applied only once the document write went
        // through; a failure above leaves it eligible for retry.
        self.applied.insert(dedup, ());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<LedgerEntry>, StorageError> {
        self.documents
            .iter()
            .filter(|kv| kv.key().starts_with("ledger:"))
            .map(|kv| Self::decode(kv.value()))
            .collect()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load_rules(&self) -> Result<Vec<LimitRule>, StorageError> {
        let mut rules: Vec<LimitRule> = self
            .documents
            .iter()
            .filter(|kv| kv.key().starts_with("rule:"))
            .map(|kv| Self::decode(kv.value()))
            .collect::<Result<_, _>>()?;
        rules.sort_by_key(|rule| rule.id);
        Ok(rules)
    }

    async fn save_rule(&self, rule: &LimitRule) -> Result<(), StorageError> {
        self.documents
            .insert(format!("rule:{}", rule.id.0), Self::encode(rule)?);
        Ok(())
    }

    async fn load_merge_rules(&self) -> Result<Vec<MergeRule>, StorageError> {
        match self.documents.get("merge-rules") {
            Some(raw) => Self::decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    async fn save_merge_rule(&self, rule: &MergeRule) -> Result<(), StorageError> {
        let mut rules = self.load_merge_rules().await?;
        rules.retain(|existing| existing.origin != rule.origin);
        rules.push(rule.clone());
        self.documents
            .insert("merge-rules".to_string(), Self::encode(&rules)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::{CanonicalHost, HostPattern};
    use crate::domain::period::CalendarDay;
    use crate::domain::rule::LimitKind;
    use chrono::NaiveDate;

    fn delta_from(producer: u64, seq: u64, seconds: u64) -> LedgerDelta {
        LedgerDelta {
            producer,
            seq,
            host: CanonicalHost::new("example.com"),
            day: CalendarDay::from_date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()),
            seconds,
            visits: 1,
        }
    }

    fn delta(seq: u64, seconds: u64) -> LedgerDelta {
        delta_from(1, seq, seconds)
    }

    #[tokio::test]
    async fn test_deltas_merge_additively() {
        let store = MemoryStore::new();
        store.save_delta(&delta(1, 100)).await.unwrap();
        store.save_delta(&delta(2, 50)).await.unwrap();

        let entries = store.load().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].focused_seconds, 150);
        assert_eq!(entries[0].visits, 2);
    }

    #[tokio::test]
    async fn test_replayed_delta_is_applied_once() {
        let store = MemoryStore::new();
        let d = delta(7, 100);
        store.save_delta(&d).await.unwrap();
        store.save_delta(&d).await.unwrap();

        let entries = store.load().await.unwrap();
        assert_eq!(entries[0].focused_seconds, 100);
        assert_eq!(entries[0].visits, 1);
    }

    #[tokio::test]
    async fn test_same_seq_from_different_producers_both_apply() {
        let store = MemoryStore::new();
        store.save_delta(&delta_from(1, 1, 100)).await.unwrap();
        store.save_delta(&delta_from(2, 1, 50)).await.unwrap();

        let entries = store.load().await.unwrap();
        assert_eq!(entries[0].focused_seconds, 150);
        assert_eq!(entries[0].visits, 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_delta_retryable() {
        let store = MemoryStore::new();
        let d = delta(1, 100);
        let key = MemoryStore::ledger_key(d.host.as_str(), &d.day);

        // A corrupt document makes the read-modify-write fail; the delta
        // must not be marked applied by that attempt.
        store.documents.insert(key.clone(), "not json".to_string());
        assert!(store.save_delta(&d).await.is_err());

        store.documents.remove(&key);
        store.save_delta(&d).await.unwrap();

        let entries = store.load().await.unwrap();
        assert_eq!(entries[0].focused_seconds, 100);
    }

    #[tokio::test]
    async fn test_rules_round_trip_sorted_by_id() {
        let store = MemoryStore::new();
        let mut a = LimitRule::draft(
            HostPattern::parse("a.com").unwrap(),
            LimitKind::Daily,
            100,
        );
        a.id = crate::domain::rule::RuleId(2);
        let mut b = a.clone();
        b.id = crate::domain::rule::RuleId(1);

        store.save_rule(&a).await.unwrap();
        store.save_rule(&b).await.unwrap();

        let rules = store.load_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules[0].id < rules[1].id);
    }

    #[tokio::test]
    async fn test_merge_rules_keep_order_and_replace_by_origin() {
        let store = MemoryStore::new();
        let first = MergeRule::new(
            HostPattern::parse("*.example.com").unwrap(),
            CanonicalHost::new("example.com"),
        );
        let second = MergeRule::new(
            HostPattern::parse("video.example.com").unwrap(),
            CanonicalHost::new("video-sites"),
        );
        store.save_merge_rule(&first).await.unwrap();
        store.save_merge_rule(&second).await.unwrap();

        // Same origin replaces, landing at the end of the list
        let replacement = MergeRule::new(
            HostPattern::parse("*.example.com").unwrap(),
            CanonicalHost::new("entertainment"),
        );
        store.save_merge_rule(&replacement).await.unwrap();

        let rules = store.load_merge_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0], second);
        assert_eq!(rules[1], replacement);
    }
}
