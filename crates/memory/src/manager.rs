//! Aggregates the typed buckets of one conversation behind a single handle.

use agentloop_core::error::MemoryError;
use agentloop_core::memory::{BucketStats, MemoryEntry, MemoryType};
use std::collections::BTreeMap;
use tracing::info;

use crate::bucket::MemoryBucket;

/// Memory for one conversation. Owned by its orchestrator; other code gets
/// `&MemoryManager` for reads.
#[derive(Debug, Clone)]
pub struct MemoryManager {
    buckets: BTreeMap<MemoryType, MemoryBucket>,
}

impl MemoryManager {
    /// A manager with every [`MemoryType`] registered.
    pub fn new(max_size: usize) -> Self {
        Self::with_types(&MemoryType::ALL, max_size)
    }

    /// A manager with only the given types registered. Access to any other
    /// type fails with [`MemoryError::InvalidType`].
    pub fn with_types(types: &[MemoryType], max_size: usize) -> Self {
        let buckets = types
            .iter()
            .map(|&t| (t, MemoryBucket::new(t, max_size)))
            .collect::<BTreeMap<_, _>>();

        info!(
            types = ?buckets.keys().map(|t| t.as_str()).collect::<Vec<_>>(),
            max_size,
            "Memory manager initialized"
        );

        Self { buckets }
    }

    pub fn get(&self, kind: MemoryType) -> Result<&MemoryBucket, MemoryError> {
        self.buckets.get(&kind).ok_or(MemoryError::InvalidType(kind))
    }

    pub fn get_mut(&mut self, kind: MemoryType) -> Result<&mut MemoryBucket, MemoryError> {
        self.buckets
            .get_mut(&kind)
            .ok_or(MemoryError::InvalidType(kind))
    }

    /// Append to the bucket of the given type.
    pub fn set(
        &mut self,
        kind: MemoryType,
        payload: serde_json::Value,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), MemoryError> {
        self.get_mut(kind)?.add(payload, metadata);
        Ok(())
    }

    pub fn get_last(&self, kind: MemoryType, count: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(self.get(kind)?.get_last(count))
    }

    pub fn get_range(
        &self,
        kind: MemoryType,
        start: usize,
        end: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(self.get(kind)?.get_range(start, end))
    }

    pub fn clear_all(&mut self) {
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
        info!("All memory cleared");
    }

    /// `{size, is_empty}` per registered type.
    pub fn get_stats(&self) -> BTreeMap<MemoryType, BucketStats> {
        self.buckets.iter().map(|(k, b)| (*k, b.stats())).collect()
    }

    pub fn is_registered(&self, kind: MemoryType) -> bool {
        self.buckets.contains_key(&kind)
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(1000)
    }
}
