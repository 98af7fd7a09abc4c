use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{FleetResult, HostId, MetricSample};

/// Selection of samples for one host
#[derive(Debug, Clone)]
pub struct QueryRange {
    pub host_id: HostId,

    /// Only samples with this name; all names when `None`
    pub metric_name: Option<String>,

    /// Start of time range (inclusive)
    pub start: Option<DateTime<Utc>>,

    /// End of time range (inclusive)
    pub end: Option<DateTime<Utc>>,

    /// Maximum number of results, newest kept
    pub limit: Option<usize>,
}

impl QueryRange {
    pub fn host(host_id: HostId) -> Self {
        Self {
            host_id,
            metric_name: None,
            start: None,
            end: None,
            limit: None,
        }
    }

    pub fn matches(&self, sample: &MetricSample) -> bool {
        self.metric_name
            .as_deref()
            .is_none_or(|name| name == sample.name)
            && self.start.is_none_or(|start| sample.timestamp >= start)
            && self.end.is_none_or(|end| sample.timestamp <= end)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub hosts: usize,
    pub samples: usize,
    pub evicted: u64,
}

/// Storage for metric samples
///
/// Implementations must be `Send + Sync`; they are shared by the intake path, the API and the
/// housekeeping actor.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Append samples reported by a host, in arrival order.
    async fn append(&self, host_id: HostId, samples: &[MetricSample]) -> FleetResult<()>;

    /// Samples matching the query, oldest first.
    async fn query_range(&self, query: &QueryRange) -> FleetResult<Vec<MetricSample>>;

    /// The most recent `limit` samples of a host, newest first.
    async fn latest(&self, host_id: HostId, limit: usize) -> FleetResult<Vec<MetricSample>>;

    /// Delete samples older than `before`, returning how many were removed.
    async fn cleanup_before(&self, before: DateTime<Utc>) -> FleetResult<usize>;

    async fn stats(&self) -> StoreStats;
}
