//! `agentloop parse` — run the parser and gate on one piece of model output.

use agentloop_agent::{ParseOutcome, parse};
use agentloop_config::AppConfig;
use agentloop_security::{AuditLogger, SecurityGate, SecurityPolicy};
use std::sync::Arc;

pub fn run(config: &AppConfig, text: &str) -> anyhow::Result<()> {
    let gate = SecurityGate::new(
        SecurityPolicy::from_config(&config.security),
        Arc::new(AuditLogger::tracing()),
    );

    match parse(text) {
        ParseOutcome::Command(call) => {
            println!("🔧 Tool call: {}", call.name);
            println!("   Kind:      {:?}", call.kind());
            println!("   Arguments: {}", serde_json::to_string_pretty(&call.arguments)?);

            let verdict = gate.classify(&call.name, &call.arguments);
            if verdict.dangerous {
                println!(
                    "   ⚠️  Needs confirmation: {}",
                    verdict.reason.as_deref().unwrap_or("dangerous tool")
                );
            } else {
                println!("   ✅ Safe to run");
            }
        }
        ParseOutcome::NotACommand => println!("💬 Not a command (plain answer)"),
        ParseOutcome::Malformed(reason) => println!("❌ Malformed tool call: {reason}"),
        ParseOutcome::Object(object) => {
            println!("📦 JSON object without a tool call:");
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
    }

    Ok(())
}
