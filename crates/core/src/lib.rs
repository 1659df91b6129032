//! # agentloop core
//!
//! Domain types, collaborator traits, and error definitions for the agentloop
//! reasoning loop. This crate holds no loop logic. It defines the model that
//! the parser, gate, memory store and orchestrator crates implement against.
//!
//! ## Design Philosophy
//!
//! Every side-effecting collaborator (model client, tool executor) is a trait
//! here. Implementations are injected by the host, which keeps the loop
//! testable with scripted fakes and lets independent conversations share
//! nothing but immutable configuration.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{BucketStats, MemoryEntry, MemoryType};
pub use message::{Message, Role, SessionId};
pub use provider::ModelClient;
pub use tool::{Arguments, Tool, ToolCall, ToolExecutor, ToolKind, ToolRegistry};
pub use turn::{ConversationTurn, ToolResultRecord};
