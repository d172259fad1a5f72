//! Priority queue core (C6): a max-heap keyed by `(priority desc, sequence asc)`.
//!
//! Sequence lives in the heap entry, not in [`QueueItem`] itself — the idiomatic
//! `BinaryHeap<T: Ord>` rendition pairs a wrapper type's `Ord` with the domain type,
//! rather than teaching the domain struct how to compare itself for heap purposes.

use super::item::QueueItem;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone)]
struct HeapEntry {
    sequence: u64,
    item: QueueItem,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.item.priority == other.item.priority && self.sequence == other.sequence
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority compares greater (pops first from the max-heap).
        // Equal priority: lower sequence compares greater (FIFO within a band).
        self.item.priority.cmp(&other.item.priority).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// `Push`/`Pop`/`Peek`/`Len`/`RemoveWhere` over a plain max-heap array; no per-item
/// locking (the owning [`crate::queue::manager::QueueManager`] guards all access).
#[derive(Default)]
pub struct PriorityHeap {
    heap: BinaryHeap<HeapEntry>,
    next_sequence: u64,
}

impl PriorityHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `item`, assigning it the next monotonic sequence number. O(log n).
    pub fn push(&mut self, item: QueueItem) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(HeapEntry { sequence, item });
    }

    /// Removes and returns the highest-priority item. O(log n).
    pub fn pop(&mut self) -> Option<QueueItem> {
        self.heap.pop().map(|entry| entry.item)
    }

    /// Returns the highest-priority item without removing it. O(1).
    pub fn peek(&self) -> Option<&QueueItem> {
        self.heap.peek().map(|entry| &entry.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes and returns every item matching `pred`, leaving the rest re-heapified.
    /// O(n) scan + O(n·log n) rebuild.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&QueueItem) -> bool) -> Vec<QueueItem> {
        let drained: Vec<HeapEntry> = std::mem::take(&mut self.heap).into_vec();
        let (removed, kept): (Vec<_>, Vec<_>) = drained.into_iter().partition(|e| pred(&e.item));
        self.heap = BinaryHeap::from(kept);
        removed.into_iter().map(|e| e.item).collect()
    }

    /// Non-destructive snapshot of contained items, in no particular order.
    pub fn iter_items(&self) -> impl Iterator<Item = &QueueItem> {
        self.heap.iter().map(|entry| &entry.item)
    }

    /// Removes and returns the first item (by heap order) for which `pred` matches.
    /// Used by `DequeueFiltered` — an administrative, non-admission-gated path.
    pub fn remove_first_where(&mut self, mut pred: impl FnMut(&QueueItem) -> bool) -> Option<QueueItem> {
        let drained: Vec<HeapEntry> = std::mem::take(&mut self.heap).into_vec();
        let mut found = None;
        let mut kept = Vec::with_capacity(drained.len());
        for entry in drained {
            if found.is_none() && pred(&entry.item) {
                found = Some(entry.item);
            } else {
                kept.push(entry);
            }
        }
        self.heap = BinaryHeap::from(kept);
        found
    }

    /// Rebuilds from a restored snapshot, reassigning sequences in iteration
    /// order (used by `restore_state`).
    pub fn rebuild_from(&mut self, items: Vec<QueueItem>) {
        self.heap.clear();
        self.next_sequence = 0;
        for item in items {
            self.push(item);
        }
    }
}
