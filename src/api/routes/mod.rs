//! Route handlers grouped by resource

pub mod agent;
pub mod alerts;
pub mod components;
pub mod deployments;
pub mod health;
pub mod hosts;
pub mod notifications;
