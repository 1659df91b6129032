//! Injected collaborators of the reasoning loop, with default implementations.
//!
//! The model client and tool executor traits live in `agentloop-core`; the
//! ones here are specific to how the orchestrator prepares a query and asks
//! for permission.

use agentloop_core::error::Result;
use agentloop_core::memory::MemoryType;
use agentloop_core::tool::Arguments;
use agentloop_memory::MemoryManager;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

/// Turns raw user input into the query the model sees.
///
/// An empty result means the input was rejected.
#[async_trait]
pub trait QueryNormalizer: Send + Sync {
    async fn reformat(&self, query: &str) -> String;
}

/// Builds the context object for a query from read-only memory.
#[async_trait]
pub trait ContextBuilder: Send + Sync {
    async fn build(&self, query: &str, memory: &MemoryManager) -> Result<serde_json::Value>;
}

/// Asks someone (a user, a policy service) whether a dangerous call may run.
#[async_trait]
pub trait ConfirmationChannel: Send + Sync {
    async fn ask_confirmation(&self, tool_name: &str, arguments: &Arguments) -> bool;
}

// ── Defaults ───────────────────────────────────────────────────────────────

/// Validates length, drops control characters, collapses whitespace and
/// makes sure the query ends with `.`, `!` or `?`.
#[derive(Debug, Clone)]
pub struct StandardNormalizer {
    min_len: usize,
    max_len: usize,
}

impl StandardNormalizer {
    pub fn new() -> Self {
        Self {
            min_len: 2,
            max_len: 10_000,
        }
    }

    pub fn normalize(&self, query: &str) -> String {
        let trimmed = query.trim();
        let len = trimmed.chars().count();
        if len < self.min_len || len > self.max_len {
            warn!(length = len, "Query length out of bounds");
            return String::new();
        }

        let sanitized: String = trimmed
            .chars()
            .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
            .filter(|c| !c.is_control())
            .collect();

        let mut normalized = sanitized.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return normalized;
        }
        if !normalized.ends_with(['.', '!', '?']) {
            normalized.push('.');
        }
        normalized
    }
}

impl Default for StandardNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryNormalizer for StandardNormalizer {
    async fn reformat(&self, query: &str) -> String {
        self.normalize(query)
    }
}

/// Context = the query plus the most recent earlier queries.
#[derive(Debug, Clone)]
pub struct MemoryContextBuilder {
    history: usize,
}

impl MemoryContextBuilder {
    pub fn new(history: usize) -> Self {
        Self { history }
    }
}

impl Default for MemoryContextBuilder {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl ContextBuilder for MemoryContextBuilder {
    async fn build(&self, query: &str, memory: &MemoryManager) -> Result<serde_json::Value> {
        let recent = memory
            .get_last(MemoryType::Queries, self.history)?
            .into_iter()
            .map(|entry| entry.payload)
            .collect::<Vec<_>>();

        debug!(recalled = recent.len(), "Context built from memory");
        Ok(json!({
            "query": query,
            "recent_queries": recent,
        }))
    }
}

/// Refuses every dangerous call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl ConfirmationChannel for DenyAll {
    async fn ask_confirmation(&self, _tool_name: &str, _arguments: &Arguments) -> bool {
        false
    }
}

/// Approves every dangerous call. For trusted sandboxes and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

#[async_trait]
impl ConfirmationChannel for ApproveAll {
    async fn ask_confirmation(&self, _tool_name: &str, _arguments: &Arguments) -> bool {
        true
    }
}
