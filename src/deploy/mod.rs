//! Deployment Registry
//!
//! Tracks component definitions and, per host, the append-only history of install attempts.
//!
//! ## Deployment State Machine
//!
//! ```text
//! PENDING ──command enqueued──► INSTALLING ──agent result──► INSTALLED
//!    │                              │
//!    └──enqueue failed──► FAILED ◄──┘ (agent reported failure)
//! ```
//!
//! Terminal states (`INSTALLED`, `FAILED`) set `end_time` and are never left. At most one
//! deployment per (host, component) pair is non-terminal at any time.

pub mod model;
pub mod registry;

pub use model::{Component, ComponentState, Deployment, DeploymentStatus};
pub use registry::{DeploymentRegistry, ResultDisposition};
