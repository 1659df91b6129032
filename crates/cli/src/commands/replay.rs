//! `agentloop replay` — run a scripted transcript through the real loop.

use agentloop_agent::{ApproveAll, ConfirmationChannel, Orchestrator};
use agentloop_config::AppConfig;
use agentloop_core::event::{DomainEvent, EventBus};
use agentloop_core::tool::Arguments;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::script::{ReplayModel, ReplayTools, Script};

/// Asks on stderr, reads `y`/`yes` from stdin. Anything else is a denial.
struct StdinConfirmation;

#[async_trait]
impl ConfirmationChannel for StdinConfirmation {
    async fn ask_confirmation(&self, tool_name: &str, arguments: &Arguments) -> bool {
        let args = serde_json::to_string(arguments).unwrap_or_default();
        let prompt = format!("⚠️  Allow '{tool_name}' with {args}? [y/N] ");

        let mut stderr = tokio::io::stderr();
        if stderr.write_all(prompt.as_bytes()).await.is_err() || stderr.flush().await.is_err() {
            return false;
        }

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                warn!(error = %e, "Failed to read confirmation");
                false
            }
        }
    }
}

pub async fn run(config: &AppConfig, script_path: &Path, approve_all: bool) -> anyhow::Result<()> {
    let script = Script::load(script_path)?;

    let model = Arc::new(ReplayModel::new(script.replies));
    let tools = Arc::new(ReplayTools::new(script.tools)?);
    let confirmation: Arc<dyn ConfirmationChannel> = if approve_all {
        Arc::new(ApproveAll)
    } else {
        Arc::new(StdinConfirmation)
    };

    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();

    let mut orchestrator =
        Orchestrator::from_config(config, model.clone(), tools, confirmation).with_event_bus(bus);

    println!("🔁 Replaying {} (session {})", script_path.display(), orchestrator.session_id());

    for query in &script.queries {
        println!();
        println!("❓ {query}");
        let outcome = orchestrator.process_query(query).await;

        while let Ok(event) = events.try_recv() {
            match &*event {
                DomainEvent::ToolExecuted { tool_name, success, duration_ms, .. } => {
                    let mark = if *success { "✅" } else { "❌" };
                    println!("   {mark} {tool_name} ({duration_ms} ms)");
                }
                DomainEvent::ConfirmationRequested { tool_name, reason, .. } => {
                    println!("   🔒 {tool_name}: {}", reason.as_deref().unwrap_or("confirmation required"));
                }
                _ => {}
            }
        }

        if outcome.success {
            let mut flags = Vec::new();
            if outcome.is_truncated() {
                flags.push("truncated");
            }
            if outcome.is_denied() {
                flags.push("denied");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };
            println!(
                "💬 {}{flags}",
                outcome.response.as_deref().unwrap_or_default()
            );
        } else {
            println!("❌ {}", outcome.error.as_deref().unwrap_or("unknown error"));
        }
    }

    println!();
    println!("🧠 Memory");
    for (kind, stats) in orchestrator.memory_stats() {
        println!("   {:<13} {}", kind.as_str(), stats.size);
    }
    if model.remaining() > 0 {
        println!("   ({} unused model replies)", model.remaining());
    }
    Ok(())
}
