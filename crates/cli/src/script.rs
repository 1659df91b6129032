//! Replay scripts: recorded model replies and tool results in TOML.
//!
//! ```toml
//! queries = ["Show me README.md."]
//! replies = [
//!     '{"tool_name": "read_file", "arguments": {"file_path": "README.md"}}',
//!     "README.md is a short introduction.",
//! ]
//!
//! [[tools]]
//! name = "read_file"
//! result = "# agentloop\nA reasoning loop."
//!
//! [[tools]]
//! name = "bash"
//! error = "permission denied"
//! ```
//!
//! Replies are consumed in order across all queries. Tool results are
//! consumed in order per tool name.

use agentloop_core::error::{ProviderError, ToolError};
use agentloop_core::message::Message;
use agentloop_core::provider::ModelClient;
use agentloop_core::tool::{Arguments, ToolExecutor};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub queries: Vec<String>,
    #[serde(default)]
    pub replies: Vec<String>,
    #[serde(default)]
    pub tools: Vec<ToolStep>,
}

/// One recorded tool result: a value, or an error message.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolStep {
    pub name: String,
    #[serde(default)]
    pub result: Option<toml::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Script {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid script {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let script: Self = toml::from_str(content)?;
        if script.queries.is_empty() {
            anyhow::bail!("script has no queries");
        }
        if let Some(step) = script.tools.iter().find(|s| s.result.is_some() == s.error.is_some()) {
            anyhow::bail!("tool step '{}' needs exactly one of `result` or `error`", step.name);
        }
        Ok(script)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Plays back recorded model replies. Runs dry with `EmptyResponse`.
pub struct ReplayModel {
    replies: Mutex<VecDeque<String>>,
}

impl ReplayModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl ModelClient for ReplayModel {
    fn name(&self) -> &str {
        "replay"
    }

    async fn chat(&self, messages: &[Message]) -> Result<String, ProviderError> {
        debug!(messages = messages.len(), "Replaying model reply");
        lock(&self.replies)
            .pop_front()
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Plays back recorded tool results per tool name.
pub struct ReplayTools {
    steps: Mutex<HashMap<String, VecDeque<Result<serde_json::Value, String>>>>,
}

impl ReplayTools {
    pub fn new(steps: Vec<ToolStep>) -> anyhow::Result<Self> {
        let mut by_name: HashMap<String, VecDeque<_>> = HashMap::new();
        for step in steps {
            let outcome = match (step.result, step.error) {
                (Some(value), _) => Ok(serde_json::to_value(value)?),
                (None, Some(error)) => Err(error),
                (None, None) => Err(format!("no recorded result for '{}'", step.name)),
            };
            by_name.entry(step.name).or_default().push_back(outcome);
        }
        Ok(Self {
            steps: Mutex::new(by_name),
        })
    }
}

#[async_trait]
impl ToolExecutor for ReplayTools {
    async fn execute(
        &self,
        name: &str,
        _arguments: &Arguments,
    ) -> Result<serde_json::Value, ToolError> {
        let next = lock(&self.steps)
            .get_mut(name)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(value)) => Ok(value),
            Some(Err(reason)) => Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason,
            }),
            None => Err(ToolError::NotFound(name.to_string())),
        }
    }
}
