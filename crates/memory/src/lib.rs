//! Bounded, typed conversation memory for agentloop.
//!
//! Each conversation owns one [`MemoryManager`]; the manager owns one
//! [`MemoryBucket`] per registered [`MemoryType`](agentloop_core::MemoryType).
//! Buckets are append-only FIFO logs: the only ways out are eviction and
//! `clear`.

pub mod bucket;
pub mod manager;

pub use bucket::MemoryBucket;
pub use manager::MemoryManager;
