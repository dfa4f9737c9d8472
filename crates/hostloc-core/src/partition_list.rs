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

//! A lock-free, intrusive, singly-linked list keyed by string.
//!
//! `Get` never blocks and never mutates. `Insert` publishes a fresh node with
//! a single CAS on `head`, then sweeps any now-stale nodes sharing its key.
//! `Delete`/`tryRemove` use the classic indirect-pointer protocol: the cell
//! that points at the target (either `head` or some node's `next`) is CAS'd
//! from the target to its successor. Unlinked nodes are freed once
//! `crossbeam-epoch` determines no reader can still be walking through them —
//! this is the list's answer to the hazard the spec calls out explicitly:
//! a thread unlinked from under a concurrent reader must not be freed while
//! that reader might still dereference it.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::Ordering;

struct Node<V> {
    key: Box<str>,
    value: V,
    next: Atomic<Node<V>>,
}

pub struct PartitionList<V> {
    head: Atomic<Node<V>>,
}

impl<V> Default for PartitionList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> PartitionList<V> {
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    /// Reads are wait-free: walk `head` and return the first match.
    pub fn get(&self, key: &str) -> Option<V> {
        let guard = &epoch::pin();
        let mut cur = self.head.load(Ordering::Acquire, guard);
        while let Some(node) = unsafe { cur.as_ref() } {
            if node.key.as_ref() == key {
                return Some(node.value.clone());
            }
            cur = node.next.load(Ordering::Acquire, guard);
        }
        None
    }

    /// Publishes a fresh node ahead of `head`, then unlinks any stale nodes
    /// that share `key`. Multiple racing inserts of the same key each sweep
    /// independently; the list converges on at most one reachable node per
    /// key once all concurrent inserts return.
    pub fn insert(&self, key: &str, value: V) {
        let guard = &epoch::pin();
        let mut new_node = Owned::new(Node {
            key: Box::from(key),
            value,
            next: Atomic::null(),
        });
        let published = loop {
            let head = self.head.load(Ordering::Acquire, guard);
            new_node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, new_node, Ordering::AcqRel, Ordering::Acquire, guard)
            {
                Ok(published) => break published,
                Err(err) => new_node = err.new,
            }
        };
        self.sweep_duplicates(key, published, guard);
    }

    /// Locates `key` and unlinks it, retrying the search after a lost CAS
    /// race until either no node matches or a removal succeeds.
    pub fn delete(&self, key: &str) -> bool {
        let guard = &epoch::pin();
        loop {
            let Some(target) = self.find(key, guard) else {
                return false;
            };
            if self.try_remove(target, guard) {
                return true;
            }
        }
    }

    fn find<'g>(&self, key: &str, guard: &'g Guard) -> Option<Shared<'g, Node<V>>> {
        let mut cur = self.head.load(Ordering::Acquire, guard);
        while let Some(node) = unsafe { cur.as_ref() } {
            if node.key.as_ref() == key {
                return Some(cur);
            }
            cur = node.next.load(Ordering::Acquire, guard);
        }
        None
    }

    /// Walks from `head` via the indirect-pointer technique (the address of
    /// the previous cell, be it `head` or some node's `next`) until the cell
    /// referencing `target` is found, then CASes it to `target`'s successor.
    /// Returns `false` if `target` is no longer reachable (already unlinked
    /// by a racing remover) or if the CAS itself lost a race.
    fn try_remove(&self, target: Shared<'_, Node<V>>, guard: &Guard) -> bool {
        let mut prev_link = &self.head;
        loop {
            let cur = prev_link.load(Ordering::Acquire, guard);
            if cur.is_null() {
                return false;
            }
            if cur == target {
                let succ = unsafe { cur.as_ref() }
                    .expect("non-null shared has a referent")
                    .next
                    .load(Ordering::Acquire, guard);
                return match prev_link.compare_exchange(
                    cur,
                    succ,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                ) {
                    Ok(_) => {
                        // SAFETY: `cur` is unreachable from `head` from this
                        // point on; no future walk can observe it, only
                        // readers already holding a reference from before
                        // this CAS, and the epoch guard defers the actual
                        // free until they've all unpinned.
                        unsafe { guard.defer_destroy(cur) };
                        true
                    }
                    Err(_) => false,
                };
            }
            prev_link = &unsafe { cur.as_ref() }
                .expect("non-null shared has a referent")
                .next;
        }
    }

    /// After publishing `published`, unlink every earlier node sharing its
    /// key. A failed `try_remove` here (lost race) is not retried: the
    /// racing operation that beat us has already restored uniqueness, or
    /// will sweep the same duplicate itself.
    fn sweep_duplicates(&self, key: &str, published: Shared<'_, Node<V>>, guard: &Guard) {
        let published_node = unsafe { published.as_ref() }.expect("just published");
        let mut cur = published_node.next.load(Ordering::Acquire, guard);
        while let Some(node) = unsafe { cur.as_ref() } {
            let next = node.next.load(Ordering::Acquire, guard);
            if node.key.as_ref() == key {
                self.try_remove(cur, guard);
            }
            cur = next;
        }
    }
}

impl<V> Drop for PartitionList<V> {
    fn drop(&mut self) {
        // Exclusive access at drop time: no concurrent readers remain, so a
        // plain (non-epoch-guarded) walk that frees as it goes is sound.
        let guard = &epoch::pin();
        let mut cur = self.head.load(Ordering::Relaxed, guard);
        self.head.store(Shared::null(), Ordering::Relaxed);
        while let Some(node) = unsafe { cur.as_ref() } {
            let next = node.next.load(Ordering::Relaxed, guard);
            unsafe { guard.defer_destroy(cur) };
            cur = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn insert_then_get_round_trips() {
        let list = PartitionList::new();
        list.insert("zero", 0);
        list.insert("one", 1);
        list.insert("two", 2);
        assert_eq!(list.get("zero"), Some(0));
        assert_eq!(list.get("one"), Some(1));
        assert_eq!(list.get("two"), Some(2));
        assert_eq!(list.get("three"), None);
    }

    #[test]
    fn delete_removes_only_target_key() {
        let list = PartitionList::new();
        list.insert("zero", 0);
        list.insert("one", 1);
        list.insert("two", 2);
        assert!(list.delete("one"));
        assert_eq!(list.get("one"), None);
        assert_eq!(list.get("zero"), Some(0));
        assert_eq!(list.get("two"), Some(2));
    }

    #[test]
    fn delete_of_missing_key_is_false() {
        let list = PartitionList::new();
        list.insert("zero", 0);
        assert!(!list.delete("missing"));
    }

    #[test]
    fn reinsert_replaces_value_and_keeps_single_node() {
        let list = PartitionList::new();
        list.insert("k", 1);
        list.insert("k", 2);
        list.insert("k", 3);
        assert_eq!(list.get("k"), Some(3));
        // The stale duplicates must have been swept: deleting once should
        // remove the key entirely, with nothing left to find afterwards.
        assert!(list.delete("k"));
        assert_eq!(list.get("k"), None);
    }

    #[test]
    fn thirty_two_keys_round_trip() {
        let list = PartitionList::new();
        for i in 0..32 {
            list.insert(&i.to_string(), i);
        }
        for i in 0..32 {
            assert_eq!(list.get(&i.to_string()), Some(i));
        }
    }

    #[test]
    fn concurrent_deletes_of_same_key_exactly_one_wins() {
        let list = Arc::new(PartitionList::new());
        list.insert("contested", 42);
        let wins: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let list = Arc::clone(&list);
                    s.spawn(move || list.delete("contested"))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(wins.iter().filter(|w| **w).count(), 1);
        assert_eq!(list.get("contested"), None);
    }

    #[test]
    fn concurrent_inserts_of_same_key_leave_one_reachable_node() {
        let list = Arc::new(PartitionList::new());
        std::thread::scope(|s| {
            for v in 0..8 {
                let list = Arc::clone(&list);
                s.spawn(move || list.insert("k", v));
            }
        });
        // Exactly one value of the racing inserts is now reachable.
        let found = list.get("k");
        assert!(found.is_some());
        assert!((0..8).contains(&found.unwrap()));
        // And exactly one node remains reachable for the key: a single
        // delete is enough to make it disappear.
        assert!(list.delete("k"));
        assert_eq!(list.get("k"), None);
    }
}
