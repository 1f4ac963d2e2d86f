use std::collections::VecDeque;

use recap_common::ChatRole;
pub use recap_common::HistoryEntry;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded log of past generation exchanges. The oldest entry is evicted
/// once `capacity` is reached; `len() <= capacity` always holds.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ConversationHistory {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, role: ChatRole, content: impl Into<String>) {
        self.push_entry(HistoryEntry::new(role, content));
    }

    pub fn push_entry(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Rebuild from saved entries, oldest first, keeping the newest
    /// `capacity` of them.
    pub fn restore(capacity: usize, entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut history = Self::new(capacity);
        for entry in entries {
            history.push_entry(entry);
        }
        history
    }

    /// Owned copy of the entries, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
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
}
