//! Metric sample retention
//!
//! Samples arriving with heartbeats are kept per host so operators can look at recent values.
//! The housekeeping actor periodically deletes samples older than the retention period.
//!
//! - **MetricStore**: trait implemented by storage backends
//! - **MemoryStore**: bounded per-host ring buffers, nothing survives a restart

pub mod backend;
pub mod memory;

pub use backend::{MetricStore, QueryRange, StoreStats};
pub use memory::MemoryStore;
