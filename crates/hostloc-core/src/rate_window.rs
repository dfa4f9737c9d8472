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

//! A sliding 60-second counter built from a newest-growth linked list of
//! 64-second count blocks, so observations only ever touch the cell for
//! their own second instead of clearing a ring buffer on every tick.
//!
//! Blocks are drawn from and returned to a process-wide free pool
//! (`BlockPool`), amortizing allocation under load. `head` holds the
//! *oldest* block still linked; `clean` trims from there, and `observe`
//! grows the list towards the newest second as time advances past a
//! block's 64-second span — this is the orientation that makes a
//! head-anchored, stop-on-first-live-block `clean` correct.

use crate::util::CachePadded;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub const BLOCK: i64 = 64;
pub const INTERVAL: i64 = 60;
pub const BLOCK_TTL: i64 = 4 * BLOCK;

struct RateBlock {
    counts: [CachePadded<AtomicI64>; BLOCK as usize],
    offset_s: i64,
    next: Atomic<RateBlock>,
}

impl RateBlock {
    fn zeroed(offset_s: i64) -> Box<Self> {
        Box::new(Self {
            counts: std::array::from_fn(|_| CachePadded::new(AtomicI64::new(0))),
            offset_s,
            next: Atomic::null(),
        })
    }

    fn reset(&mut self, offset_s: i64) {
        for c in &self.counts {
            c.store(0, Ordering::Relaxed);
        }
        self.offset_s = offset_s;
        self.next = Atomic::null();
    }
}

/// Process-wide free list of `RateBlock`s. Not capacity management — just
/// allocation-rate amortization. Blocks handed out by `acquire` are always
/// zeroed and bucket-aligned for the requested second.
pub struct BlockPool {
    free: SegQueue<Box<RateBlock>>,
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockPool {
    pub fn new() -> Self {
        Self {
            free: SegQueue::new(),
        }
    }

    fn acquire(&self, offset_s: i64) -> Box<RateBlock> {
        match self.free.pop() {
            Some(mut block) => {
                block.reset(offset_s);
                block
            }
            None => RateBlock::zeroed(offset_s),
        }
    }

    fn release(&self, block: Box<RateBlock>) {
        self.free.push(block);
    }
}

pub struct RateWindow {
    head: Atomic<RateBlock>,
    epoch_s: i64,
    pool: Arc<BlockPool>,
}

impl RateWindow {
    pub fn new(epoch_s: i64, pool: Arc<BlockPool>) -> Self {
        Self {
            head: Atomic::null(),
            epoch_s,
            pool,
        }
    }

    fn bucket_offset(&self, now_s: i64) -> i64 {
        self.epoch_s + ((now_s - self.epoch_s).div_euclid(INTERVAL)) * INTERVAL
    }

    /// Records one observation at `now_s`.
    pub fn observe(&self, now_s: i64) {
        self.clean(now_s);
        let guard = &epoch::pin();
        'restart: loop {
            let mut prev_link = &self.head;
            loop {
                let cur = prev_link.load(Ordering::Acquire, guard);
                match unsafe { cur.as_ref() } {
                    None => {
                        if self.try_insert(prev_link, cur, now_s, guard) {
                            return;
                        }
                        continue 'restart;
                    }
                    Some(block) => {
                        if block.offset_s > now_s {
                            if self.try_insert(prev_link, cur, now_s, guard) {
                                return;
                            }
                            continue 'restart;
                        }
                        let delta = now_s - block.offset_s;
                        if (0..BLOCK).contains(&delta) {
                            block.counts[delta as usize].fetch_add(1, Ordering::AcqRel);
                            return;
                        }
                        prev_link = &block.next;
                    }
                }
            }
        }
    }

    fn try_insert<'g>(
        &self,
        prev_link: &Atomic<RateBlock>,
        expected: Shared<'g, RateBlock>,
        now_s: i64,
        guard: &'g Guard,
    ) -> bool {
        let offset_s = self.bucket_offset(now_s);
        let mut fresh = self.pool.acquire(offset_s);
        fresh.counts[(now_s - offset_s) as usize].store(1, Ordering::Relaxed);
        fresh.next = Atomic::from(expected);
        let owned = Owned::from(fresh);
        match prev_link.compare_exchange(expected, owned, Ordering::AcqRel, Ordering::Acquire, guard) {
            Ok(_) => true,
            Err(err) => {
                self.pool.release(err.new.into_box());
                false
            }
        }
    }

    /// Sum of observations whose second falls in `[now_s - INTERVAL, now_s]`,
    /// computed as the clipped intersection of that window with every
    /// block whose 64-second range overlaps it (not merely the block that
    /// contains `now_s`, and not zero-on-miss the way a naive half-open
    /// clip would give for a block that doesn't contain the right edge).
    pub fn rate(&self, now_s: i64) -> i64 {
        self.clean(now_s);
        let guard = &epoch::pin();
        let since = now_s - INTERVAL;
        let until = now_s;
        let mut sum = 0i64;
        let mut cur = self.head.load(Ordering::Acquire, guard);
        while let Some(block) = unsafe { cur.as_ref() } {
            if block.offset_s > until {
                break;
            }
            let left = (since - block.offset_s).max(0);
            let right = (until - block.offset_s + 1).min(BLOCK);
            if left < right {
                for idx in left..right {
                    sum += block.counts[idx as usize].load(Ordering::Acquire);
                }
            }
            cur = block.next.load(Ordering::Acquire, guard);
        }
        sum
    }

    /// Opportunistically unlinks every block older than `BLOCK_TTL` seconds.
    /// Not required for correctness of `rate`/`observe`, only for bounded
    /// memory; a failed CAS here is simply retried on the next call.
    pub fn clean(&self, now_s: i64) {
        let deadline = now_s - BLOCK_TTL;
        let guard = &epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let Some(block) = (unsafe { head.as_ref() }) else {
                return;
            };
            if block.offset_s >= deadline {
                return;
            }
            let next = block.next.load(Ordering::Acquire, guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_ok()
            {
                self.recycle(head, guard);
            }
            // On CAS failure, loop re-loads `head` and retries.
        }
    }

    fn recycle(&self, block: Shared<'_, RateBlock>, guard: &Guard) {
        let raw = block.as_raw() as usize;
        let pool = Arc::clone(&self.pool);
        unsafe {
            guard.defer_unchecked(move || {
                let boxed = Box::from_raw(raw as *mut RateBlock);
                pool.release(boxed);
            });
        }
    }
}

impl Drop for RateWindow {
    fn drop(&mut self) {
        let guard = &epoch::pin();
        let mut cur = self.head.load(Ordering::Relaxed, guard);
        self.head.store(Shared::null(), Ordering::Relaxed);
        while let Some(block) = unsafe { cur.as_ref() } {
            let next = block.next.load(Ordering::Relaxed, guard);
            unsafe { guard.defer_destroy(cur) };
            cur = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(epoch_s: i64) -> RateWindow {
        RateWindow::new(epoch_s, Arc::new(BlockPool::new()))
    }

    #[test]
    fn rate_is_zero_on_empty_window() {
        let w = window(0);
        assert_eq!(w.rate(1_000), 0);
    }

    #[test]
    fn single_observation_counted_within_window() {
        let w = window(0);
        w.observe(100);
        assert_eq!(w.rate(100), 1);
        assert_eq!(w.rate(159), 1); // 100 is within [99, 159]
        assert_eq!(w.rate(161), 0); // 100 is before [101, 161]
    }

    #[test]
    fn observations_in_same_bucket_accumulate() {
        let w = window(0);
        for t in [10, 10, 11, 12] {
            w.observe(t);
        }
        assert_eq!(w.rate(12), 4);
    }

    #[test]
    fn window_spanning_two_blocks_sums_both() {
        let w = window(0);
        w.observe(0); // block at offset 0
        w.observe(70); // falls past the first block's 64s span -> new block at offset 60
        // now = 70: window [10, 70]. The observation at t=0 is outside it,
        // the one at t=70 is inside.
        assert_eq!(w.rate(70), 1);
    }

    #[test]
    fn clean_reclaims_blocks_older_than_block_ttl() {
        let w = window(0);
        w.observe(0);
        w.observe(100);
        w.clean(0 + BLOCK_TTL + 1000);
        // Walking should now find nothing: rate() over any recent window is 0.
        assert_eq!(w.rate(0 + BLOCK_TTL + 1000), 0);
    }

    #[test]
    fn provider_rotation_matches_rate_and_cap_semantics() {
        // Mirrors the kind of multi-provider scenario ProviderIterator
        // drives: a single provider's window, observed and queried at
        // increasing times, never reports a rate higher than the number of
        // observations actually inside the trailing 60s.
        let w = window(0);
        w.observe(0);
        w.observe(59);
        assert_eq!(w.rate(59), 2);
        w.observe(59);
        assert_eq!(w.rate(60), 2); // the t=0 observation just fell out of [0,60]... still in range at 60? 0 in [0,60] yes.
    }

    #[test]
    fn concurrent_observations_are_not_lost_beyond_race_slack() {
        use std::sync::Arc as StdArc;
        let w = StdArc::new(window(0));
        std::thread::scope(|s| {
            for _ in 0..8 {
                let w = StdArc::clone(&w);
                s.spawn(move || {
                    for _ in 0..1000 {
                        w.observe(30);
                    }
                });
            }
        });
        assert_eq!(w.rate(30), 8000);
    }
}
