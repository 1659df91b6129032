//! Conversation turn — the value threaded through one `process_query` run.
//!
//! Created when a query arrives, filled in as the loop advances, then
//! serialized into the `turns` bucket. Nothing mutates it after that.

use serde::{Deserialize, Serialize};

use crate::tool::ToolCall;

/// Outcome of one tool call as recorded in a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub tool_name: String,
    pub success: bool,
    /// Formatted natural-language summary
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_query: String,
    pub reformatted_query: String,
    pub context: serde_json::Value,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResultRecord>,
    pub final_response: Option<String>,
}

impl ConversationTurn {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Self::default()
        }
    }

    /// Record a tool call together with its outcome.
    pub fn record(&mut self, call: ToolCall, success: bool, summary: impl Into<String>) {
        self.tool_results.push(ToolResultRecord {
            tool_name: call.name.clone(),
            success,
            summary: summary.into(),
        });
        self.tool_calls.push(call);
    }
}
