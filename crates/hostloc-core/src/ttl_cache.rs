// Copyright (C) 2026 The hostloc Contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! An `N`-way partitioned map from lookup key to resolved country, with
//! per-entry TTL and an optional cooperative sweeper for memory reclamation
//! of idle keys. `Get`-side expiry is authoritative; the sweeper exists only
//! to bound memory when keys go idle and are never looked up again.

use crate::clock::{Clock, SystemClock};
use crate::fnv::fnv1a32;
use crate::partition_list::PartitionList;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct EntryInner {
    value: String,
    last_access_ns: AtomicI64,
    deadline_ns: AtomicI64,
}

type Entry = Arc<EntryInner>;

pub struct TTLCache {
    partitions: Vec<PartitionList<Entry>>,
    ttl_ns: i64,
    clock: Arc<dyn Clock>,
}

impl TTLCache {
    pub fn new(ttl: Duration, npartitions: usize) -> Self {
        Self::with_clock(ttl, npartitions, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, npartitions: usize, clock: Arc<dyn Clock>) -> Self {
        assert!(npartitions > 0, "partition count must be positive");
        Self {
            partitions: (0..npartitions).map(|_| PartitionList::new()).collect(),
            ttl_ns: ttl.as_nanos() as i64,
            clock,
        }
    }

    fn partition_of(&self, key: &str) -> &PartitionList<Entry> {
        let idx = (fnv1a32(key) as usize) % self.partitions.len();
        &self.partitions[idx]
    }

    /// Returns the cached value, actively expiring it (and helping unlink it)
    /// if its deadline has passed. Advances `last_access_ns` via a CAS loop
    /// that never regresses it.
    pub fn get(&self, key: &str) -> Option<String> {
        let partition = self.partition_of(key);
        let entry = partition.get(key)?;
        let now = self.clock.now_ns();
        if now > entry.deadline_ns.load(Ordering::Acquire) {
            partition.delete(key);
            return None;
        }
        let mut old = entry.last_access_ns.load(Ordering::Acquire);
        while old < now {
            match entry.last_access_ns.compare_exchange(
                old,
                now,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => old = actual,
            }
        }
        Some(entry.value.clone())
    }

    /// Publishes a fresh entry with `deadline_ns = now + ttl`. A refreshing
    /// insert of an already-present key does not carry over the old entry's
    /// `last_access_ns` — it gets a brand new one, same as any other insert.
    pub fn insert(&self, key: &str, value: impl Into<String>) {
        let now = self.clock.now_ns();
        let entry = Arc::new(EntryInner {
            value: value.into(),
            last_access_ns: AtomicI64::new(now),
            deadline_ns: AtomicI64::new(now + self.ttl_ns),
        });
        self.partition_of(key).insert(key, entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.partition_of(key).delete(key)
    }

    /// Exposed for tests: the raw `last_access_ns` of a live key, if present.
    pub fn last_access_ns(&self, key: &str) -> Option<i64> {
        self.partition_of(key)
            .get(key)
            .map(|e| e.last_access_ns.load(Ordering::Acquire))
    }

    /// One sweep pass over every partition: unlinks expired entries via the
    /// list's normal `tryRemove` protocol (no privileged access), and
    /// returns how long the sweeper should wait before its next pass —
    /// `min_wake` at the least, to avoid busy-spinning if a block of entries
    /// all expired in the past.
    pub fn sweep_once(&self, min_wake: Duration) -> Duration {
        let now = self.clock.now_ns();
        let mut min_deadline = now + self.ttl_ns;
        for partition in &self.partitions {
            partition.sweep(|entry: &Entry| {
                let deadline = entry.deadline_ns.load(Ordering::Acquire);
                if now > deadline {
                    true
                } else {
                    min_deadline = min_deadline.min(deadline);
                    false
                }
            });
        }
        let wait_ns = (min_deadline - now).max(min_wake.as_nanos() as i64);
        Duration::from_nanos(wait_ns as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache_with_clock(ttl_secs: u64, npartitions: usize) -> (TTLCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = TTLCache::with_clock(Duration::from_secs(ttl_secs), npartitions, clock.clone());
        (cache, clock)
    }

    #[test]
    fn round_trip_for_many_keys() {
        let (cache, _clock) = cache_with_clock(300, 4);
        for i in 0..32 {
            cache.insert(&i.to_string(), i.to_string());
        }
        for i in 0..32 {
            assert_eq!(cache.get(&i.to_string()), Some(i.to_string()));
        }
    }

    #[test]
    fn delete_removes_only_named_key() {
        let (cache, _clock) = cache_with_clock(300, 4);
        cache.insert("zero", "zero");
        cache.insert("one", "one");
        cache.insert("two", "two");
        assert!(cache.delete("one"));
        assert_eq!(cache.get("one"), None);
        assert_eq!(cache.get("zero"), Some("zero".to_string()));
        assert_eq!(cache.get("two"), Some("two".to_string()));
    }

    #[test]
    fn ttl_expiry_removes_entry() {
        let (cache, clock) = cache_with_clock(60, 4);
        cache.insert("k", "v");
        clock.advance(Duration::from_secs(60).as_nanos() as i64 + 1);
        assert_eq!(cache.get("k"), None);
        // Get helped expire it: a second get still reports not-found, and a
        // fresh insert is unaffected by the stale entry.
        assert_eq!(cache.get("k"), None);
        cache.insert("k", "v2");
        assert_eq!(cache.get("k"), Some("v2".to_string()));
    }

    #[test]
    fn last_access_is_monotonic_non_decreasing() {
        let (cache, clock) = cache_with_clock(3600, 1);
        cache.insert("k", "v");
        let t0 = cache.last_access_ns("k").unwrap();
        clock.advance(1_000_000);
        cache.get("k");
        let t1 = cache.last_access_ns("k").unwrap();
        clock.advance(1_000_000);
        cache.get("k");
        let t2 = cache.last_access_ns("k").unwrap();
        assert!(t1 >= t0);
        assert!(t2 >= t1);
    }

    #[test]
    fn sweeper_unlinks_expired_and_keeps_live_entries() {
        let (cache, clock) = cache_with_clock(10, 2);
        cache.insert("expires-soon", "a");
        clock.advance(Duration::from_secs(5).as_nanos() as i64);
        cache.insert("expires-later", "b");
        clock.advance(Duration::from_secs(6).as_nanos() as i64);
        // "expires-soon" deadline was t=10s, now t=11s: expired.
        // "expires-later" deadline is t=15s: still live.
        let wait = cache.sweep_once(Duration::from_millis(1));
        assert!(wait > Duration::ZERO);
        assert_eq!(cache.get("expires-soon"), None);
        assert_eq!(cache.get("expires-later"), Some("b".to_string()));
    }

    #[test]
    fn reinsert_refreshes_deadline_and_value() {
        let (cache, clock) = cache_with_clock(10, 1);
        cache.insert("k", "v1");
        clock.advance(Duration::from_secs(9).as_nanos() as i64);
        cache.insert("k", "v2");
        clock.advance(Duration::from_secs(9).as_nanos() as i64);
        // Had the TTL not refreshed, this would already be expired (18s > 10s).
        assert_eq!(cache.get("k"), Some("v2".to_string()));
    }
}
