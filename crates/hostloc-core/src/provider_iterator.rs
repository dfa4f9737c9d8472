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

//! Rate-aware round-robin provider selection.
//!
//! Each configured provider carries its own [`RateWindow`]. `next` resumes
//! from the last provider that was handed out (the `cursor`), scanning at
//! most once around the ring for the first provider whose trailing-minute
//! rate is still under its cap. The cursor update is a plain, non-CAS
//! store: two racing callers can clobber each other's cursor advance, but
//! the cost of that race is at most a provider being revisited slightly
//! out of turn, not a correctness violation, so paying for a CAS loop here
//! buys nothing.

use crate::rate_window::{BlockPool, RateWindow};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: String,
    /// Maximum observations allowed in any trailing 60-second window.
    pub max_per_minute: i64,
}

struct Entry {
    spec: ProviderSpec,
    window: RateWindow,
}

pub struct ProviderIterator {
    cursor: AtomicI32,
    entries: Vec<Entry>,
}

impl ProviderIterator {
    pub fn new(providers: Vec<ProviderSpec>, pool: Arc<BlockPool>, epoch_s: i64) -> Self {
        let entries = providers
            .into_iter()
            .map(|spec| Entry {
                spec,
                window: RateWindow::new(epoch_s, Arc::clone(&pool)),
            })
            .collect();
        Self {
            cursor: AtomicI32::new(0),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scans the ring once, starting from the cursor, for the first
    /// provider under its cap. Records the observation against the winner
    /// and parks the cursor there before returning. Returns `None` if every
    /// provider is currently saturated.
    pub fn next(&self, now_s: i64) -> Option<&str> {
        let n = self.entries.len();
        if n == 0 {
            return None;
        }
        let start = self.cursor.load(Ordering::Acquire).rem_euclid(n as i32) as usize;
        for step in 0..n {
            let idx = (start + step) % n;
            let entry = &self.entries[idx];
            if entry.window.rate(now_s) < entry.spec.max_per_minute {
                entry.window.observe(now_s);
                self.cursor.store(idx as i32, Ordering::Relaxed);
                return Some(&entry.spec.name);
            }
        }
        None
    }
}
