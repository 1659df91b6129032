//! A single bounded memory bucket.

use agentloop_core::memory::{BucketStats, MemoryEntry, MemoryType};
use std::collections::VecDeque;
use tracing::{debug, info};

/// An ordered, bounded log of entries of one [`MemoryType`].
///
/// Each `add` beyond `max_size` evicts exactly one entry, the oldest.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    kind: MemoryType,
    max_size: usize,
    entries: VecDeque<MemoryEntry>,
}

impl MemoryBucket {
    pub fn new(kind: MemoryType, max_size: usize) -> Self {
        debug!(memory_type = %kind, max_size, "Memory bucket initialized");
        Self {
            kind,
            max_size,
            entries: VecDeque::new(),
        }
    }

    pub fn kind(&self) -> MemoryType {
        self.kind
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append a timestamped entry, evicting the oldest if over the bound.
    pub fn add(
        &mut self,
        payload: serde_json::Value,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        self.entries.push_back(MemoryEntry::new(payload, metadata));

        if self.entries.len() > self.max_size {
            if let Some(removed) = self.entries.pop_front() {
                debug!(
                    memory_type = %self.kind,
                    removed_timestamp = %removed.timestamp,
                    "Memory limit reached, removed oldest entry"
                );
            }
        }

        debug!(memory_type = %self.kind, total_entries = self.entries.len(), "Entry added");
    }

    /// The `count` most recent entries, oldest first.
    pub fn get_last(&self, count: usize) -> Vec<MemoryEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Entries with insertion index in `start..end`, clamped to the bucket.
    pub fn get_range(&self, start: usize, end: usize) -> Vec<MemoryEntry> {
        let end = end.min(self.entries.len());
        if start >= end {
            return Vec::new();
        }
        self.entries.range(start..end).cloned().collect()
    }

    pub fn get_all(&self) -> Vec<MemoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        info!(memory_type = %self.kind, entries_removed = count, "Memory cleared");
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> BucketStats {
        BucketStats {
            size: self.len(),
            is_empty: self.is_empty(),
        }
    }
}
