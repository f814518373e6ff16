//! Usage ledger: append-only per-day accumulation of focused time and visits.
//!
//! The in-memory map is the evaluation snapshot (queries are synchronous);
//! the [`LedgerStore`] port is the system of record shared across contexts.
//! Each recording call applies its delta to the map exactly once and then
//! tries to persist it. Persistence failures are buffered and retried, never
//! surfaced into the caller's activity-tracking path, and a buffered delta is
//! never re-applied to the map, so replaying it cannot double count.

use crate::application::normalizer::HostNormalizer;
use crate::application::ports::{LedgerDelta, LedgerEntry, LedgerStore, StorageError};
use crate::domain::host::CanonicalHost;
use crate::domain::period::CalendarDay;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Accumulated usage for one (host, day) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    focused_seconds: u64,
    visits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LedgerKey {
    host: CanonicalHost,
    day: CalendarDay,
}

/// Per-day usage accounting over canonical hosts.
///
/// Values are monotonically non-decreasing within a day. Entries are created
/// on first activity and mutated by increments only; retention/cleanup is an
/// external concern.
pub struct UsageLedger {
    entries: DashMap<LedgerKey, Tally>,
    normalizer: Arc<HostNormalizer>,
    store: Arc<dyn LedgerStore>,
    /// Deltas applied in memory but not yet persisted.
    pending: Mutex<Vec<LedgerDelta>>,
    /// Random id distinguishing this ledger's deltas from those of other
    /// contexts sharing the same store.
    producer: u64,
    seq: AtomicU64,
}

impl UsageLedger {
    /// Create an empty ledger.
    pub fn new(normalizer: Arc<HostNormalizer>, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            entries: DashMap::new(),
            normalizer,
            store,
            pending: Mutex::new(Vec::new()),
            producer: rand::random(),
            seq: AtomicU64::new(1),
        }
    }

    /// Record page activity.
    ///
    /// Normalizes the host, adds `active_seconds` to the (host, day) entry,
    /// and counts a visit when `is_new_visit` is set. The persistence flush
    /// is the only suspension point; a storage failure is buffered and this
    /// call still succeeds from the caller's point of view.
    pub async fn record(
        &self,
        raw_host: &str,
        active_seconds: u64,
        is_new_visit: bool,
        when: DateTime<Utc>,
    ) {
        let visits = u64::from(is_new_visit);
        if active_seconds == 0 && visits == 0 {
            return;
        }

        let host = self.normalizer.normalize(raw_host);
        let day = CalendarDay::of(when);
        let key = LedgerKey {
            host: host.clone(),
            day,
        };
        {
            let mut entry = self.entries.entry(key).or_default();
            entry.focused_seconds += active_seconds;
            entry.visits += visits;
        }

        let delta = LedgerDelta {
            producer: self.producer,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            host,
            day,
            seconds: active_seconds,
            visits,
        };
        if let Err(e) = self.store.save_delta(&delta).await {
            warn!(host = %delta.host, seq = delta.seq, error = %e, "buffering ledger delta");
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(delta);
        }
    }

    /// Record measured elapsed time that may be negative due to clock skew.
    ///
    /// Negative values are clamped to zero and logged; accounting never goes
    /// backwards and never crashes on anomalous clocks.
    pub async fn record_elapsed(
        &self,
        raw_host: &str,
        elapsed_seconds: i64,
        is_new_visit: bool,
        when: DateTime<Utc>,
    ) {
        let clamped = if elapsed_seconds < 0 {
            warn!(
                host = raw_host,
                elapsed_seconds, "negative elapsed time clamped to zero"
            );
            0
        } else {
            elapsed_seconds as u64
        };
        self.record(raw_host, clamped, is_new_visit, when).await;
    }

    /// Retry persistence of buffered deltas.
    ///
    /// At-least-once delivery: a delta that fails again stays buffered, in
    /// order. Buffered deltas were already applied to the in-memory map, so
    /// the retry path never touches it; the store deduplicates by the
    /// (producer, seq) pair in case an earlier delivery half-succeeded.
    pub async fn flush_pending(&self) {
        let deltas = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };
        if deltas.is_empty() {
            return;
        }

        let mut still_pending = Vec::new();
        for delta in deltas {
            if let Err(e) = self.store.save_delta(&delta).await {
                warn!(seq = delta.seq, error = %e, "ledger delta retry failed");
                still_pending.push(delta);
            }
        }
        let retried = still_pending.len();
        if retried > 0 {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            // Deltas recorded while flushing keep their order after the
            // retried ones.
            still_pending.append(&mut pending);
            *pending = still_pending;
        }
        debug!(remaining = retried, "ledger flush complete");
    }

    /// Number of deltas waiting for a successful flush.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Sum of focused seconds for `host` over an inclusive day range.
    ///
    /// Missing days count as zero. Used for weekly windows.
    pub fn focused_seconds_in_range(
        &self,
        host: &CanonicalHost,
        from: CalendarDay,
        to: CalendarDay,
    ) -> u64 {
        from.range_inclusive(to)
            .map(|day| {
                self.entries
                    .get(&LedgerKey {
                        host: host.clone(),
                        day,
                    })
                    .map(|tally| tally.focused_seconds)
                    .unwrap_or(0)
            })
            .sum()
    }

    /// Number of visits to `host` on `day`.
    pub fn visits_on_day(&self, host: &CanonicalHost, day: CalendarDay) -> u64 {
        self.entries
            .get(&LedgerKey {
                host: host.clone(),
                day,
            })
            .map(|tally| tally.visits)
            .unwrap_or(0)
    }

    /// Load persisted entries into the in-memory snapshot, merging additively.
    ///
    /// # Errors
    /// Returns `StorageError` when the store is unavailable; the snapshot is
    /// left untouched in that case.
    pub async fn hydrate(&self) -> Result<(), StorageError> {
        let persisted = self.store.load().await?;
        for entry in persisted {
            let key = LedgerKey {
                host: entry.host,
                day: entry.day,
            };
            let mut tally = self.entries.entry(key).or_default();
            tally.focused_seconds += entry.focused_seconds;
            tally.visits += entry.visits;
        }
        Ok(())
    }

    /// Snapshot all entries, e.g. for administration views.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .map(|kv| LedgerEntry {
                host: kv.key().host.clone(),
                day: kv.key().day,
                focused_seconds: kv.value().focused_seconds,
                visits: kv.value().visits,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::MemoryStore;
    use chrono::TimeZone;

    fn ledger() -> UsageLedger {
        UsageLedger::new(Arc::new(HostNormalizer::new()), Arc::new(MemoryStore::new()))
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_record_accumulates_within_a_day() {
        let ledger = ledger();
        let host = CanonicalHost::new("example.com");
        let day = CalendarDay::of(at(9));

        ledger.record("example.com", 100, true, at(9)).await;
        ledger.record("example.com", 50, false, at(10)).await;

        assert_eq!(ledger.focused_seconds_in_range(&host, day, day), 150);
        assert_eq!(ledger.visits_on_day(&host, day), 1);
    }

    #[tokio::test]
    async fn test_record_is_monotonic() {
        let ledger = ledger();
        let host = CanonicalHost::new("example.com");
        let day = CalendarDay::of(at(9));

        let mut last = 0;
        for seconds in [10, 0, 25, 5] {
            ledger.record("example.com", seconds, false, at(9)).await;
            let total = ledger.focused_seconds_in_range(&host, day, day);
            assert!(total >= last);
            last = total;
        }
        assert_eq!(last, 40);
    }

    #[tokio::test]
    async fn test_negative_elapsed_is_clamped() {
        let ledger = ledger();
        let host = CanonicalHost::new("example.com");
        let day = CalendarDay::of(at(9));

        ledger.record_elapsed("example.com", -30, false, at(9)).await;
        assert_eq!(ledger.focused_seconds_in_range(&host, day, day), 0);

        ledger.record_elapsed("example.com", 30, false, at(9)).await;
        assert_eq!(ledger.focused_seconds_in_range(&host, day, day), 30);
    }

    #[tokio::test]
    async fn test_range_sums_across_days_missing_days_zero() {
        let ledger = ledger();
        let host = CanonicalHost::new("example.com");
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 12, 0, 0).unwrap();
        let friday = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

        ledger.record("example.com", 600, true, monday).await;
        ledger.record("example.com", 300, true, friday).await;

        let total = ledger.focused_seconds_in_range(
            &host,
            CalendarDay::of(monday),
            CalendarDay::of(friday),
        );
        assert_eq!(total, 900);
    }

    #[tokio::test]
    async fn test_records_are_keyed_by_canonical_host() {
        let normalizer = Arc::new(HostNormalizer::new());
        normalizer.add_rule(crate::domain::merge::MergeRule::new(
            crate::domain::host::HostPattern::parse("*.example.com").unwrap(),
            CanonicalHost::new("example.com"),
        ));
        let ledger = UsageLedger::new(normalizer, Arc::new(MemoryStore::new()));
        let merged = CanonicalHost::new("example.com");
        let day = CalendarDay::of(at(9));

        ledger.record("video.example.com", 100, true, at(9)).await;
        ledger.record("music.example.com", 200, true, at(10)).await;

        assert_eq!(ledger.focused_seconds_in_range(&merged, day, day), 300);
        assert_eq!(ledger.visits_on_day(&merged, day), 2);
    }

    #[tokio::test]
    async fn test_hydrate_merges_persisted_entries() {
        let store = Arc::new(MemoryStore::new());
        let ledger = UsageLedger::new(Arc::new(HostNormalizer::new()), store.clone());
        ledger.record("example.com", 100, true, at(9)).await;

        // A second context sharing the same store sees the persisted usage.
        let other = UsageLedger::new(Arc::new(HostNormalizer::new()), store);
        other.hydrate().await.unwrap();

        let host = CanonicalHost::new("example.com");
        let day = CalendarDay::of(at(9));
        assert_eq!(other.focused_seconds_in_range(&host, day, day), 100);
    }

    #[tokio::test]
    async fn test_concurrent_contexts_never_lose_each_others_deltas() {
        // Two contexts (e.g. two tabs) share one store. Their sequence
        // counters both start at 1; the producer id keeps their deltas apart.
        let store = Arc::new(MemoryStore::new());
        let tab_a = UsageLedger::new(Arc::new(HostNormalizer::new()), store.clone());
        let tab_b = UsageLedger::new(Arc::new(HostNormalizer::new()), store.clone());

        tab_a.record("example.com", 100, true, at(9)).await;
        tab_b.record("example.com", 50, true, at(9)).await;

        let fresh = UsageLedger::new(Arc::new(HostNormalizer::new()), store);
        fresh.hydrate().await.unwrap();

        let host = CanonicalHost::new("example.com");
        let day = CalendarDay::of(at(9));
        assert_eq!(fresh.focused_seconds_in_range(&host, day, day), 150);
        assert_eq!(fresh.visits_on_day(&host, day), 2);
    }
}
