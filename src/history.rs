// SPDX-License-Identifier: MIT
// Bounded suggestion history.
//
// Fixed-capacity, insertion-ordered store of past suggestions. Lookups scan
// newest-first so the most recent matching entry wins; insertion
// de-duplicates on the full (text, prefix, suffix) triple and evicts the
// oldest entry once the capacity is reached.

use std::collections::VecDeque;

use tracing::debug;

use crate::model::Suggestion;

/// Default number of suggestions retained per editing session.
pub const DEFAULT_CAPACITY: usize = 20;

/// Insertion-ordered, capacity-bounded suggestion store.
///
/// Thread-safety: wrap in a `Mutex` for shared use.
pub struct SuggestionHistory {
    capacity: usize,
    /// Front = oldest, back = newest.
    entries: VecDeque<Suggestion>,
}

impl SuggestionHistory {
    /// Create a history bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append a suggestion, de-duplicating on the full triple and evicting
    /// the oldest entry when at capacity.
    pub fn push(&mut self, suggestion: Suggestion) {
        if self.entries.contains(&suggestion) {
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(
                    evicted_prefix_len = evicted.prefix.len(),
                    "suggestion history full, evicting oldest entry"
                );
            }
        }
        self.entries.push_back(suggestion);
    }

    /// Iterate entries newest-first.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Suggestion> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for SuggestionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
