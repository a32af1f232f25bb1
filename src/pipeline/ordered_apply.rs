// src/pipeline/ordered_apply.rs
//
// Reorder buffer in front of the counting engine. Producers may finish
// frames out of order; state is only ever mutated in sequence order.

use std::collections::BTreeMap;
use tracing::warn;

/// An item tagged with its position in the source stream (0-based).
#[derive(Debug, Clone)]
pub struct Sequenced<T> {
    pub seq: u64,
    pub item: T,
}

pub struct OrderedApply<T> {
    next_seq: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> OrderedApply<T> {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Accepts one item and returns every item now releasable in order.
    pub fn push(&mut self, seq: u64, item: T) -> Vec<T> {
        if seq < self.next_seq || self.pending.contains_key(&seq) {
            warn!("Duplicate sequence number {} ignored", seq);
            return Vec::new();
        }
        self.pending.insert(seq, item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next_seq) {
            ready.push(item);
            self.next_seq += 1;
        }
        ready
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

impl<T> Default for OrderedApply<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_passes_through() {
        let mut stage = OrderedApply::new();
        assert_eq!(stage.push(0, "a"), vec!["a"]);
        assert_eq!(stage.push(1, "b"), vec!["b"]);
        assert_eq!(stage.pending_len(), 0);
    }

    #[test]
    fn test_out_of_order_is_held_back() {
        let mut stage = OrderedApply::new();
        assert!(stage.push(2, 'c').is_empty());
        assert!(stage.push(1, 'b').is_empty());
        assert_eq!(stage.pending_len(), 2);
        assert_eq!(stage.push(0, 'a'), vec!['a', 'b', 'c']);
        assert_eq!(stage.next_seq(), 3);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut stage = OrderedApply::new();
        stage.push(0, 1);
        assert!(stage.push(0, 99).is_empty());
        stage.push(2, 3);
        assert!(stage.push(2, 98).is_empty());
        assert_eq!(stage.push(1, 2), vec![2, 3]);
    }
}
