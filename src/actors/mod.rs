//! Long-running control plane tasks
//!
//! Each actor runs as an independent tokio task, owns its state, and is controlled through a
//! handle that wraps an mpsc command channel.
//!
//! ```text
//!   Alert Evaluator ──dispatch──► NotifierActor ──bounded pool──► Discord / Webhook
//!                                       │
//!                                       └──► NotificationAudit
//!
//!   Agent results ──► ResultProcessorActor ──► DeploymentRegistry
//!
//!   Timer ──► HousekeepingActor ──► MetricStore (retention)
//!                               └─► HostDirectory (offline sweep)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Work queues**: deliveries and command results flow through their own channels
//! 3. **Request/Response**: oneshot channels for synchronous queries and graceful shutdown

pub mod housekeeping;
pub mod messages;
pub mod notifier;
pub mod result_processor;

pub use housekeeping::HousekeepingHandle;
pub use notifier::NotifierHandle;
pub use result_processor::ResultProcessorHandle;
