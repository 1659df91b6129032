//! Memory domain types — typed buckets of turn artifacts.
//!
//! The store itself lives in `agentloop-memory`; these are the values it
//! holds and reports, shared with the context builder and display tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one memory bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Raw user queries
    Queries,
    /// Context objects handed to the model
    Contexts,
    /// Formatted tool result summaries
    ToolResults,
    /// Completed conversation turns
    Turns,
}

impl MemoryType {
    /// Every known bucket type, in display order.
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Queries,
        MemoryType::Contexts,
        MemoryType::ToolResults,
        MemoryType::Turns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Queries => "queries",
            MemoryType::Contexts => "contexts",
            MemoryType::ToolResults => "tool_results",
            MemoryType::Turns => "turns",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a memory bucket.
///
/// Entries are never mutated after being appended; they leave a bucket only
/// through eviction or `clear`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// When this entry was appended
    pub timestamp: DateTime<Utc>,

    /// The stored artifact
    pub payload: serde_json::Value,

    /// Free-form metadata (session id, reformatted query, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryEntry {
    pub fn new(
        payload: serde_json::Value,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
            metadata,
        }
    }
}

/// Size snapshot of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStats {
    pub size: usize,
    pub is_empty: bool,
}
