//! Alert rules, alert events and the evaluator turning metric samples into events.
//!
//! ## Event State Machine
//!
//! ```text
//! OPEN ──acknowledge──► ACKNOWLEDGED
//!   │                        │
//!   └────────resolve─────────┴──► RESOLVED
//! ```
//!
//! An event is "open" for deduplication purposes until it is resolved. While a
//! (rule, host, service) tuple has an open event, further breaches for that tuple are
//! suppressed.

pub mod evaluator;
pub mod event;
pub mod rule;

pub use evaluator::{AlertEvaluator, MetricObservation};
pub use event::{AlertEvent, AlertStatistics, AlertStatus, EventFilter};
pub use rule::{AlertRule, AlertRuleDraft, ComparisonOperator, Severity};

pub type RuleId = u64;
pub type EventId = u64;
