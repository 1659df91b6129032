//! The reasoning loop — the heart of agentloop.
//!
//! The orchestrator follows a **Reason → Act → Observe** cycle:
//!
//! 1. **Receive** a user query and reformat it
//! 2. **Build context** from conversation memory
//! 3. **Call the model** with system prompt, context and query
//! 4. **If the reply parses as a tool call**: gate it, execute it, format the
//!    result, append it and loop back to step 3
//! 5. **Otherwise**: the reply is the answer
//!
//! The loop continues until the model answers in plain text, calls
//! `task_complete`, a dangerous call is denied, or `max_turns` is reached.

pub mod collaborators;
pub mod format;
pub mod loop_runner;
pub mod parser;

#[cfg(test)]
mod test_helpers;

pub use collaborators::{
    ApproveAll, ConfirmationChannel, ContextBuilder, DenyAll, MemoryContextBuilder,
    QueryNormalizer, StandardNormalizer,
};
pub use format::{format_failure, format_tool_result};
pub use loop_runner::{Orchestrator, QueryOutcome};
pub use parser::{CommandParser, ParseOutcome, parse};
