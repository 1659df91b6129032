//! The reasoning loop: one query in, one [`QueryOutcome`] out.
//!
//! Per query the orchestrator reformats the input, builds a context from
//! memory, then alternates model calls and tool calls until the model gives
//! a final answer or `max_turns` model calls have been made:
//!
//! 1. **Call the model** with the working conversation
//! 2. **Parse** its reply; anything that is not a tool call is the answer
//! 3. **Gate** the call; dangerous calls need confirmation, denial ends the turn
//! 4. **Execute** through the injected [`ToolExecutor`]; failures are reported
//!    back to the model, not raised
//! 5. **Format** the result, append it to the conversation and memory, loop
//!
//! Nothing escapes [`Orchestrator::process_query`]: errors and panics become
//! a failed outcome.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentloop_config::AppConfig;
use agentloop_core::error::{Error, MemoryError, Result, ToolError};
use agentloop_core::event::{DomainEvent, EventBus};
use agentloop_core::memory::{BucketStats, MemoryEntry, MemoryType};
use agentloop_core::message::{Message, SessionId};
use agentloop_core::provider::ModelClient;
use agentloop_core::tool::{ToolCall, ToolExecutor, ToolKind};
use agentloop_core::turn::ConversationTurn;
use agentloop_memory::MemoryManager;
use agentloop_security::{AuditEvent, AuditLogger, AuditOutcome, SecurityGate, SecurityPolicy};
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::collaborators::{
    ConfirmationChannel, ContextBuilder, MemoryContextBuilder, QueryNormalizer, StandardNormalizer,
};
use crate::format::{format_failure, format_tool_result, reports_failure};
use crate::parser::{self, ParseOutcome};

const INVALID_QUERY: &str = "Query is empty or invalid. Please provide a valid message.";
const TASK_COMPLETE_DEFAULT: &str = "Task completed successfully";

/// The result of one `process_query` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `session_id`, and on success `reformatted_query`, `turns`,
    /// `tool_calls`, `truncated`, `denied`
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl QueryOutcome {
    fn answered(response: String, metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
            metadata,
        }
    }

    fn failed(error: String, session_id: &SessionId) -> Self {
        let mut metadata = Map::new();
        metadata.insert("session_id".into(), json!(session_id.as_str()));
        Self {
            success: false,
            response: None,
            error: Some(error),
            metadata,
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// The loop ran out of turns before the model gave a final answer.
    pub fn is_truncated(&self) -> bool {
        self.flag("truncated")
    }

    /// A dangerous call was refused (or the confirmation timed out).
    pub fn is_denied(&self) -> bool {
        self.flag("denied")
    }

    /// Number of model calls made.
    pub fn turns(&self) -> u32 {
        self.metadata
            .get("turns")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    }
}

/// How a single query's loop ended.
enum Ending {
    Answer(String),
    Denied(String),
    Truncated(String),
}

/// Drives queries through the reasoning loop for one conversation.
///
/// Owns the conversation's memory and session id; collaborators are shared.
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolExecutor>,
    gate: Arc<SecurityGate>,
    confirmation: Arc<dyn ConfirmationChannel>,
    normalizer: Arc<dyn QueryNormalizer>,
    context_builder: Arc<dyn ContextBuilder>,

    memory: MemoryManager,
    session_id: SessionId,

    /// Maximum model calls per query
    max_turns: u32,
    system_prompt: String,
    confirmation_timeout: Duration,

    event_bus: Option<Arc<EventBus>>,
}

impl Orchestrator {
    /// Create an orchestrator with default settings.
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolExecutor>,
        gate: Arc<SecurityGate>,
        confirmation: Arc<dyn ConfirmationChannel>,
    ) -> Self {
        let defaults = AppConfig::default();
        let session_id = SessionId::new();
        info!(session_id = %session_id, "Orchestrator initialized");
        Self {
            model,
            tools,
            gate,
            confirmation,
            normalizer: Arc::new(StandardNormalizer::new()),
            context_builder: Arc::new(MemoryContextBuilder::new(defaults.agent.context_history)),
            memory: MemoryManager::new(defaults.memory.max_size),
            session_id,
            max_turns: defaults.agent.max_turns,
            system_prompt: defaults.agent.system_prompt,
            confirmation_timeout: Duration::from_secs(defaults.agent.confirmation_timeout_secs),
            event_bus: None,
        }
    }

    /// Create an orchestrator wired from configuration. The gate audits to
    /// `tracing` and keeps no more entries than a memory bucket.
    pub fn from_config(
        config: &AppConfig,
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolExecutor>,
        confirmation: Arc<dyn ConfirmationChannel>,
    ) -> Self {
        let gate = SecurityGate::new(
            SecurityPolicy::from_config(&config.security),
            Arc::new(AuditLogger::tracing().with_capacity(config.memory.max_size)),
        );
        Self::new(model, tools, Arc::new(gate), confirmation)
            .with_max_turns(config.agent.max_turns)
            .with_system_prompt(config.agent.system_prompt.clone())
            .with_confirmation_timeout(Duration::from_secs(config.agent.confirmation_timeout_secs))
            .with_context_builder(Arc::new(MemoryContextBuilder::new(config.agent.context_history)))
            .with_memory(MemoryManager::new(config.memory.max_size))
    }

    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn QueryNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_context_builder(mut self, builder: Arc<dyn ContextBuilder>) -> Self {
        self.context_builder = builder;
        self
    }

    /// Replace the conversation memory (e.g. to restore a previous one).
    pub fn with_memory(mut self, memory: MemoryManager) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn memory_stats(&self) -> BTreeMap<MemoryType, BucketStats> {
        self.memory.get_stats()
    }

    /// The `count` most recent raw queries, oldest first.
    pub fn query_history(&self, count: usize) -> std::result::Result<Vec<MemoryEntry>, MemoryError> {
        self.memory.get_last(MemoryType::Queries, count)
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear_all();
    }

    /// Clear memory and start a new session.
    pub fn reset(&mut self) {
        self.memory.clear_all();
        self.session_id = SessionId::new();
        info!(session_id = %self.session_id, "Orchestrator reset");
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Process one user query. Never panics and never returns an error:
    /// failures are reported in the outcome.
    pub async fn process_query(&mut self, query: &str) -> QueryOutcome {
        info!(
            session_id = %self.session_id,
            query_length = query.len(),
            "Processing query"
        );
        self.publish(DomainEvent::QueryReceived {
            session_id: self.session_id.to_string(),
            query_preview: query.chars().take(80).collect(),
            timestamp: Utc::now(),
        });

        let outcome = match AssertUnwindSafe(self.run(query)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(session_id = %self.session_id, error = %e, "Query failed");
                self.publish(DomainEvent::ErrorOccurred {
                    context: "process_query".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                QueryOutcome::failed(e.to_string(), &self.session_id)
            }
            Err(panic) => {
                let e = Error::Internal(panic_message(panic.as_ref()));
                error!(session_id = %self.session_id, error = %e, "Query panicked");
                self.publish(DomainEvent::ErrorOccurred {
                    context: "process_query".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                QueryOutcome::failed(e.to_string(), &self.session_id)
            }
        };

        self.publish(DomainEvent::QueryCompleted {
            session_id: self.session_id.to_string(),
            success: outcome.success,
            turns: outcome.turns(),
            truncated: outcome.is_truncated(),
            timestamp: Utc::now(),
        });
        outcome
    }

    async fn run(&mut self, query: &str) -> Result<QueryOutcome> {
        // ── Reformat ──
        let reformatted = self.normalizer.reformat(query).await;
        if reformatted.trim().is_empty() {
            return Err(Error::InvalidQuery(INVALID_QUERY.into()));
        }
        debug!(reformatted = %reformatted, "Query reformatted");

        // ── Context ──
        let context = self.context_builder.build(&reformatted, &self.memory).await?;

        let mut turn = ConversationTurn::new(query);
        turn.reformatted_query = reformatted.clone();
        turn.context = context.clone();

        let mut messages = vec![Message::system(&self.system_prompt)];
        if !context.is_null() {
            messages.push(Message::system(format!(
                "Context:\n{}",
                serde_json::to_string_pretty(&context)?
            )));
        }
        messages.push(Message::user(&reformatted));

        // ── Turns ──
        let mut turns_used = 0;
        let mut last_text = String::new();
        let ending = loop {
            if turns_used >= self.max_turns {
                warn!(
                    session_id = %self.session_id,
                    max_turns = self.max_turns,
                    "Max turns reached, returning last model output"
                );
                break Ending::Truncated(last_text);
            }
            turns_used += 1;
            debug!(session_id = %self.session_id, turn = turns_used, "Calling model");

            let text = self.model.chat(&messages).await?;
            messages.push(Message::assistant(&text));
            last_text = text;

            let call = match parser::parse(&last_text) {
                ParseOutcome::Command(call) => call,
                ParseOutcome::Malformed(reason) => {
                    debug!(reason = %reason, "Unparseable tool call, treating as answer");
                    break Ending::Answer(last_text);
                }
                ParseOutcome::NotACommand | ParseOutcome::Object(_) => {
                    break Ending::Answer(last_text);
                }
            };

            if call.kind() == ToolKind::TaskComplete {
                let message = call.str_arg("message").unwrap_or(TASK_COMPLETE_DEFAULT).to_string();
                info!(session_id = %self.session_id, "Task marked complete");
                turn.record(call, true, message.clone());
                break Ending::Answer(message);
            }

            // ── Gate ──
            let verdict = self.gate.classify(&call.name, &call.arguments);
            if verdict.dangerous && !self.confirm(&call, verdict.reason).await {
                let summary = Error::SecurityDenied {
                    tool_name: call.name.clone(),
                }
                .to_string();
                self.remember_tool_result(&call.name, false, &summary)?;
                turn.record(call, false, summary.clone());
                break Ending::Denied(summary);
            }

            // ── Execute + format ──
            let (success, summary) = self.execute(&call).await;
            messages.push(Message::tool_result(&call.name, &summary));
            self.remember_tool_result(&call.name, success, &summary)?;
            turn.record(call, success, summary);
        };

        // ── Respond ──
        let (response, truncated, denied) = match ending {
            Ending::Answer(text) => (text, false, false),
            Ending::Denied(text) => (text, false, true),
            Ending::Truncated(text) => (text, true, false),
        };
        turn.final_response = Some(response.clone());
        self.persist(&turn)?;

        info!(
            session_id = %self.session_id,
            turns = turns_used,
            tool_calls = turn.tool_calls.len(),
            truncated,
            denied,
            "Query completed"
        );

        let mut metadata = Map::new();
        metadata.insert("session_id".into(), json!(self.session_id.as_str()));
        metadata.insert("reformatted_query".into(), json!(reformatted));
        metadata.insert("turns".into(), json!(turns_used));
        metadata.insert("tool_calls".into(), json!(turn.tool_calls.len()));
        metadata.insert("truncated".into(), json!(truncated));
        metadata.insert("denied".into(), json!(denied));
        Ok(QueryOutcome::answered(response, metadata))
    }

    /// Ask for confirmation, bounded by the configured timeout. A timeout is
    /// a denial.
    async fn confirm(&self, call: &ToolCall, reason: Option<String>) -> bool {
        info!(tool = %call.name, reason = ?reason, "Confirmation required");
        self.publish(DomainEvent::ConfirmationRequested {
            tool_name: call.name.clone(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });

        let approved = match tokio::time::timeout(
            self.confirmation_timeout,
            self.confirmation.ask_confirmation(&call.name, &call.arguments),
        )
        .await
        {
            Ok(approved) => approved,
            Err(_) => {
                warn!(
                    tool = %call.name,
                    timeout_secs = self.confirmation_timeout.as_secs(),
                    "Confirmation timed out, treating as denied"
                );
                false
            }
        };

        let (event, outcome) = if approved {
            (AuditEvent::ConfirmationGranted { tool_name: call.name.clone() }, AuditOutcome::Success)
        } else {
            (AuditEvent::ConfirmationDenied { tool_name: call.name.clone() }, AuditOutcome::Denied)
        };
        self.gate.audit().log(event, "confirmation", &call.name, outcome, reason);
        approved
    }

    /// Run one tool call, turning errors and panics into a failure summary.
    async fn execute(&self, call: &ToolCall) -> (bool, String) {
        debug!(tool = %call.name, "Executing tool");
        let start = Instant::now();
        let result = AssertUnwindSafe(self.tools.execute(&call.name, &call.arguments))
            .catch_unwind()
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, summary) = match result {
            Ok(Ok(value)) => (
                !reports_failure(&call.name, &value),
                format_tool_result(&call.name, &value, &call.arguments),
            ),
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (false, format_failure(&call.name, &e))
            }
            Err(panic) => {
                let e = ToolError::Panicked {
                    tool_name: call.name.clone(),
                    reason: panic_message(panic.as_ref()),
                };
                error!(tool = %call.name, error = %e, "Tool panicked");
                (false, format_failure(&call.name, &e))
            }
        };

        self.gate.audit().log(
            AuditEvent::ToolExecution { tool_name: call.name.clone() },
            "orchestrator",
            &call.name,
            if success { AuditOutcome::Success } else { AuditOutcome::Failure },
            None,
        );
        self.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        (success, summary)
    }

    fn session_metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("session_id".into(), json!(self.session_id.as_str()));
        metadata
    }

    fn remember_tool_result(&mut self, tool_name: &str, success: bool, summary: &str) -> Result<()> {
        let payload = json!({
            "tool_name": tool_name,
            "success": success,
            "summary": summary,
        });
        let metadata = self.session_metadata();
        self.memory.set(MemoryType::ToolResults, payload, metadata)?;
        Ok(())
    }

    /// One entry each in `queries`, `contexts` and `turns`.
    fn persist(&mut self, turn: &ConversationTurn) -> Result<()> {
        let mut query_meta = self.session_metadata();
        query_meta.insert("reformatted".into(), json!(turn.reformatted_query));
        self.memory
            .set(MemoryType::Queries, json!(turn.user_query), query_meta)?;

        let context_meta = self.session_metadata();
        self.memory
            .set(MemoryType::Contexts, turn.context.clone(), context_meta)?;

        let turn_meta = self.session_metadata();
        self.memory
            .set(MemoryType::Turns, serde_json::to_value(turn)?, turn_meta)?;
        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ApproveAll, DenyAll};
    use crate::test_helpers::{
        NeverAnswers, PanickingModel, RecordingConfirmation, ScriptedModel, ScriptedTools,
        tool_call_json,
    };
    use agentloop_core::error::ProviderError;
    use serde_json::json;

    fn gate() -> Arc<SecurityGate> {
        Arc::new(SecurityGate::new(SecurityPolicy::default(), Arc::new(AuditLogger::new())))
    }

    fn orchestrator(
        model: Arc<ScriptedModel>,
        tools: Arc<ScriptedTools>,
        confirmation: Arc<dyn ConfirmationChannel>,
    ) -> Orchestrator {
        Orchestrator::new(model, tools, gate(), confirmation)
    }

    #[tokio::test]
    async fn plain_answer_needs_one_model_call() {
        let model = Arc::new(ScriptedModel::new(["Rust is a systems language."]));
        let tools = Arc::new(ScriptedTools::new());
        let mut orch = orchestrator(model.clone(), tools.clone(), Arc::new(DenyAll));

        let outcome = orch.process_query("What is Rust?").await;

        assert!(outcome.success);
        assert_eq!(outcome.response.as_deref(), Some("Rust is a systems language."));
        assert_eq!(outcome.turns(), 1);
        assert!(!outcome.is_truncated());
        assert_eq!(model.call_count(), 1);
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_query_fails_without_calling_the_model() {
        let model = Arc::new(ScriptedModel::new(["unused"]));
        let mut orch = orchestrator(model.clone(), Arc::new(ScriptedTools::new()), Arc::new(DenyAll));

        for query in ["", "   ", "\n\t"] {
            let outcome = orch.process_query(query).await;
            assert!(!outcome.success);
            assert!(outcome.error.unwrap().to_lowercase().contains("invalid query"));
        }
        assert_eq!(model.call_count(), 0);
        assert!(orch.memory_stats().values().all(|s| s.is_empty));
    }

    #[tokio::test]
    async fn tool_result_is_fed_back_to_the_model() {
        let model = Arc::new(ScriptedModel::new([
            tool_call_json("read_file", json!({"file_path": "lib.rs"})),
            "lib.rs has two lines.".to_string(),
        ]));
        let tools = Arc::new(ScriptedTools::new().returning("read_file", json!("mod a;\nmod b;")));
        let mut orch = orchestrator(model.clone(), tools.clone(), Arc::new(DenyAll));

        let outcome = orch.process_query("Summarize lib.rs.").await;

        assert!(outcome.success);
        assert_eq!(outcome.response.as_deref(), Some("lib.rs has two lines."));
        assert_eq!(tools.calls(), vec!["read_file".to_string()]);

        let second_call = &model.seen()[1];
        let tool_msg = second_call.last().unwrap();
        assert_eq!(tool_msg.tool_name.as_deref(), Some("read_file"));
        assert_eq!(tool_msg.content, "Successfully read file 'lib.rs' (2 lines, 13 characters)");

        let results = orch.memory().get_last(MemoryType::ToolResults, 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload["success"], true);
    }

    #[tokio::test]
    async fn dangerous_call_denied_ends_the_turn() {
        let model = Arc::new(ScriptedModel::new([tool_call_json(
            "bash",
            json!({"command": "rm -rf build"}),
        )]));
        let tools = Arc::new(ScriptedTools::new());
        let confirmation = Arc::new(RecordingConfirmation::new(false));
        let mut orch = orchestrator(model.clone(), tools.clone(), confirmation.clone());

        let outcome = orch.process_query("Clean the build dir.").await;

        assert!(outcome.success);
        assert!(outcome.is_denied());
        assert_eq!(outcome.response.as_deref(), Some("Command 'bash' cancelled by user"));
        assert!(tools.calls().is_empty());
        assert_eq!(confirmation.asked(), vec!["bash".to_string()]);
        assert_eq!(model.call_count(), 1);

        let turn = &orch.memory().get_last(MemoryType::Turns, 1).unwrap()[0];
        assert_eq!(turn.payload["tool_results"][0]["success"], false);
    }

    #[tokio::test]
    async fn denial_and_flagged_command_are_audited() {
        let model = Arc::new(ScriptedModel::new([tool_call_json(
            "execute_command",
            json!({"command": "ls && rm x"}),
        )]));
        let gate = gate();
        let mut orch = Orchestrator::new(model, Arc::new(ScriptedTools::new()), gate.clone(), Arc::new(DenyAll));

        orch.process_query("Tidy up.").await;

        let events: Vec<_> = gate.audit().entries().into_iter().map(|e| e.event).collect();
        assert!(matches!(events[0], AuditEvent::DangerousCommand { .. }));
        assert_eq!(
            events[1],
            AuditEvent::ConfirmationDenied { tool_name: "execute_command".into() }
        );
    }

    #[tokio::test]
    async fn approved_dangerous_call_executes() {
        let model = Arc::new(ScriptedModel::new([
            tool_call_json("write_file", json!({"file_path": "out.txt", "content": "hi"})),
            "Written.".to_string(),
        ]));
        let tools = Arc::new(ScriptedTools::new().returning("write_file", json!({"bytes": 2})));
        let mut orch = orchestrator(model, tools.clone(), Arc::new(ApproveAll));

        let outcome = orch.process_query("Write hi to out.txt.").await;

        assert!(outcome.success);
        assert!(!outcome.is_denied());
        assert_eq!(tools.calls(), vec!["write_file".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_counts_as_denial() {
        let model = Arc::new(ScriptedModel::new([tool_call_json("git_commit", json!({"message": "wip"}))]));
        let tools = Arc::new(ScriptedTools::new());
        let mut orch = orchestrator(model, tools.clone(), Arc::new(NeverAnswers))
            .with_confirmation_timeout(Duration::from_secs(30));

        let outcome = orch.process_query("Commit my work.").await;

        assert!(outcome.success);
        assert!(outcome.is_denied());
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn tool_error_does_not_end_the_session() {
        let model = Arc::new(ScriptedModel::new([
            tool_call_json("grep", json!({"pattern": "fn"})),
            "Search is unavailable, sorry.".to_string(),
        ]));
        let tools = Arc::new(ScriptedTools::new().failing(
            "grep",
            ToolError::ExecutionFailed {
                tool_name: "grep".into(),
                reason: "binary missing".into(),
            },
        ));
        let mut orch = orchestrator(model.clone(), tools, Arc::new(DenyAll));

        let outcome = orch.process_query("Find functions.").await;

        assert!(outcome.success);
        assert_eq!(outcome.turns(), 2);
        let feedback = model.seen()[1].last().unwrap().content.clone();
        assert!(feedback.starts_with("Tool error:"));
        assert!(feedback.contains("binary missing"));
    }

    #[tokio::test]
    async fn tool_panic_is_caught_and_reported() {
        let model = Arc::new(ScriptedModel::new([
            tool_call_json("git_log", json!({})),
            "Could not read the log.".to_string(),
        ]));
        let tools = Arc::new(ScriptedTools::new().panicking("git_log"));
        let mut orch = orchestrator(model.clone(), tools, Arc::new(DenyAll));

        let outcome = orch.process_query("Show history.").await;

        assert!(outcome.success);
        let feedback = model.seen()[1].last().unwrap().content.clone();
        assert!(feedback.contains("panicked"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let model = Arc::new(ScriptedModel::new([
            tool_call_json("frobnicate", json!({})),
            "I don't have that tool.".to_string(),
        ]));
        let mut orch = orchestrator(model.clone(), Arc::new(ScriptedTools::new()), Arc::new(DenyAll));

        let outcome = orch.process_query("Frobnicate it.").await;

        assert!(outcome.success);
        assert_eq!(
            model.seen()[1].last().unwrap().content,
            "Tool error: unknown tool 'frobnicate'"
        );
    }

    #[tokio::test]
    async fn max_turns_truncates_with_last_model_text() {
        let call = tool_call_json("git_status", json!({}));
        let model = Arc::new(ScriptedModel::new([call.clone(), call.clone(), call.clone(), call.clone()]));
        let tools = Arc::new(ScriptedTools::new().returning("git_status", json!("")));
        let mut orch = orchestrator(model.clone(), tools.clone(), Arc::new(DenyAll)).with_max_turns(3);

        let outcome = orch.process_query("Loop forever.").await;

        assert!(outcome.success);
        assert!(outcome.is_truncated());
        assert_eq!(outcome.response.as_deref(), Some(call.as_str()));
        assert_eq!(model.call_count(), 3);
        assert_eq!(tools.calls().len(), 3);
    }

    #[tokio::test]
    async fn task_complete_is_a_final_answer() {
        let model = Arc::new(ScriptedModel::new([
            tool_call_json("git_status", json!({})),
            tool_call_json("task_completed", json!({"message": "Working tree is clean."})),
        ]));
        let tools = Arc::new(ScriptedTools::new().returning("git_status", json!("")));
        let mut orch = orchestrator(model, tools.clone(), Arc::new(DenyAll));

        let outcome = orch.process_query("Is the tree clean?").await;
        assert_eq!(outcome.response.as_deref(), Some("Working tree is clean."));
        assert_eq!(tools.calls(), vec!["git_status".to_string()]);

        let model = Arc::new(ScriptedModel::new([tool_call_json("task_complete", json!({}))]));
        let mut orch = orchestrator(model, Arc::new(ScriptedTools::new()), Arc::new(DenyAll));
        let outcome = orch.process_query("Nothing to do.").await;
        assert_eq!(outcome.response.as_deref(), Some(TASK_COMPLETE_DEFAULT));
    }

    #[tokio::test]
    async fn malformed_and_object_replies_are_answers() {
        let model = Arc::new(ScriptedModel::new(["{'tool_name': 'x', 'arguments': {'q': 'it's'}}"]));
        let mut orch = orchestrator(model, Arc::new(ScriptedTools::new()), Arc::new(DenyAll));
        let outcome = orch.process_query("Hmm.").await;
        assert!(outcome.success);
        assert_eq!(outcome.turns(), 1);

        let model = Arc::new(ScriptedModel::new([r#"{"plan": ["a", "b"]}"#]));
        let mut orch = orchestrator(model, Arc::new(ScriptedTools::new()), Arc::new(DenyAll));
        let outcome = orch.process_query("Plan it.").await;
        assert_eq!(outcome.response.as_deref(), Some(r#"{"plan": ["a", "b"]}"#));
    }

    #[tokio::test]
    async fn provider_error_is_a_failure() {
        let model = Arc::new(ScriptedModel::failing(ProviderError::Timeout("30s".into())));
        let mut orch = orchestrator(model, Arc::new(ScriptedTools::new()), Arc::new(DenyAll));

        let outcome = orch.process_query("Hello there.").await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out"));
        assert!(orch.query_history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn model_panic_is_caught_at_the_boundary() {
        let mut orch = Orchestrator::new(
            Arc::new(PanickingModel),
            Arc::new(ScriptedTools::new()),
            gate(),
            Arc::new(DenyAll),
        );

        let outcome = orch.process_query("Hello there.").await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("model exploded"));
    }

    #[tokio::test]
    async fn success_persists_query_context_and_turn() {
        let model = Arc::new(ScriptedModel::new(["first answer", "second answer"]));
        let mut orch = orchestrator(model.clone(), Arc::new(ScriptedTools::new()), Arc::new(DenyAll));

        orch.process_query("first question").await;
        orch.process_query("second question").await;

        let stats = orch.memory_stats();
        assert_eq!(stats[&MemoryType::Queries].size, 2);
        assert_eq!(stats[&MemoryType::Contexts].size, 2);
        assert_eq!(stats[&MemoryType::Turns].size, 2);

        let history = orch.query_history(1).unwrap();
        assert_eq!(history[0].payload, "second question");
        assert_eq!(history[0].metadata["reformatted"], "second question.");
        assert_eq!(history[0].metadata["session_id"], orch.session_id().as_str());

        // The second context recalls the first query.
        let contexts = orch.memory().get_last(MemoryType::Contexts, 1).unwrap();
        assert_eq!(contexts[0].payload["recent_queries"], json!(["first question"]));
    }

    #[tokio::test]
    async fn system_prompt_and_context_lead_the_conversation() {
        let model = Arc::new(ScriptedModel::new(["ok"]));
        let mut orch = orchestrator(model.clone(), Arc::new(ScriptedTools::new()), Arc::new(DenyAll))
            .with_system_prompt("Be brief.");

        orch.process_query("hi there").await;

        let first = &model.seen()[0];
        assert_eq!(first[0].content, "Be brief.");
        assert!(first[1].content.starts_with("Context:"));
        assert_eq!(first[2].content, "hi there.");
    }

    #[tokio::test]
    async fn reset_clears_memory_and_rotates_session() {
        let model = Arc::new(ScriptedModel::new(["answer"]));
        let mut orch = orchestrator(model, Arc::new(ScriptedTools::new()), Arc::new(DenyAll));
        orch.process_query("question").await;
        let before = orch.session_id().clone();

        orch.reset();

        assert_ne!(orch.session_id(), &before);
        assert!(orch.memory_stats().values().all(|s| s.is_empty));
    }

    #[tokio::test]
    async fn events_are_published_in_order() {
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();
        let model = Arc::new(ScriptedModel::new([
            tool_call_json("list_files", json!({"directory": "."})),
            "Two entries.".to_string(),
        ]));
        let tools = Arc::new(ScriptedTools::new().returning("list_files", json!([])));
        let mut orch = orchestrator(model, tools, Arc::new(DenyAll)).with_event_bus(bus);

        orch.process_query("List files.").await;

        assert!(matches!(*rx.recv().await.unwrap(), DomainEvent::QueryReceived { .. }));
        assert!(matches!(
            &*rx.recv().await.unwrap(),
            DomainEvent::ToolExecuted { tool_name, success: true, .. } if tool_name == "list_files"
        ));
        assert!(matches!(
            *rx.recv().await.unwrap(),
            DomainEvent::QueryCompleted { success: true, turns: 2, truncated: false, .. }
        ));
    }

    #[tokio::test]
    async fn from_config_applies_settings() {
        let mut config = AppConfig::default();
        config.agent.max_turns = 1;
        config.agent.system_prompt = "Configured.".into();
        config.memory.max_size = 1;

        let model = Arc::new(ScriptedModel::new([
            tool_call_json("git_status", json!({})),
            "a".to_string(),
            "b".to_string(),
        ]));
        let tools = Arc::new(ScriptedTools::new().returning("git_status", json!("")));
        let mut orch = Orchestrator::from_config(&config, model.clone(), tools, Arc::new(DenyAll));

        let outcome = orch.process_query("status please").await;
        assert!(outcome.is_truncated());
        assert_eq!(model.seen()[0][0].content, "Configured.");

        orch.process_query("again").await;
        orch.process_query("and again").await;
        assert_eq!(orch.memory_stats()[&MemoryType::Queries].size, 1);
    }

    #[tokio::test]
    async fn audit_trail_stays_within_memory_bound() {
        let mut config = AppConfig::default();
        config.memory.max_size = 3;

        let mut replies = Vec::new();
        for _ in 0..50 {
            replies.push(tool_call_json("git_status", json!({})));
            replies.push("clean".to_string());
        }
        let model = Arc::new(ScriptedModel::new(replies));
        let tools = Arc::new(ScriptedTools::new().returning("git_status", json!("")));
        let mut orch = Orchestrator::from_config(&config, model, tools, Arc::new(DenyAll));

        for i in 0..50 {
            assert!(orch.process_query(&format!("status {i}")).await.success);
        }
        orch.reset();

        assert_eq!(orch.memory_stats()[&MemoryType::ToolResults].size, 0);
        assert_eq!(orch.gate.audit().count(), 3);
    }
}
