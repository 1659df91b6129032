//! Security module for agentloop — dangerous-call classification and audit
//! logging.
//!
//! Provides:
//! - **Gate**: classifies parsed tool calls as safe or needing confirmation
//! - **Audit logging**: structured record of flagged commands, confirmation
//!   decisions and tool runs

pub mod audit;
pub mod gate;

pub use audit::{DEFAULT_AUDIT_CAPACITY, AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use gate::{destructive_verb, SecurityGate, SecurityPolicy, SecurityVerdict, ShellCommandPolicy};
