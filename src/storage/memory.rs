//! In-memory metric store
//!
//! Each host gets a ring buffer with a fixed capacity. When a buffer is full the oldest samples
//! are evicted, independent of the retention cleanup.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::{FleetResult, HostId, MetricSample};

use super::backend::{MetricStore, QueryRange, StoreStats};

pub struct MemoryStore {
    metrics: RwLock<HashMap<HostId, VecDeque<MetricSample>>>,
    capacity_per_host: usize,
    evicted: AtomicU64,
}

impl MemoryStore {
    pub fn new(capacity_per_host: usize) -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            capacity_per_host: capacity_per_host.max(1),
            evicted: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn append(&self, host_id: HostId, samples: &[MetricSample]) -> FleetResult<()> {
        let mut metrics = self.metrics.write().await;
        let buffer = metrics.entry(host_id).or_default();

        for sample in samples {
            if buffer.len() == self.capacity_per_host {
                buffer.pop_front();
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(sample.clone());
        }

        trace!("stored {} samples for host {host_id}", samples.len());
        Ok(())
    }

    async fn query_range(&self, query: &QueryRange) -> FleetResult<Vec<MetricSample>> {
        let metrics = self.metrics.read().await;
        let Some(buffer) = metrics.get(&query.host_id) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<_> = buffer
            .iter()
            .filter(|sample| query.matches(sample))
            .cloned()
            .collect();

        if let Some(limit) = query.limit {
            let skip = matching.len().saturating_sub(limit);
            matching.drain(..skip);
        }

        Ok(matching)
    }

    async fn latest(&self, host_id: HostId, limit: usize) -> FleetResult<Vec<MetricSample>> {
        let metrics = self
            .metrics
            .read()
            .await
            .get(&host_id)
            .map(|buffer| buffer.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();

        Ok(metrics)
    }

    async fn cleanup_before(&self, before: DateTime<Utc>) -> FleetResult<usize> {
        let mut metrics = self.metrics.write().await;
        let mut removed = 0;

        for buffer in metrics.values_mut() {
            let len = buffer.len();
            buffer.retain(|sample| sample.timestamp >= before);
            removed += len - buffer.len();
        }
        metrics.retain(|_, buffer| !buffer.is_empty());

        debug!("removed {removed} samples older than {before}");
        Ok(removed)
    }

    async fn stats(&self) -> StoreStats {
        let metrics = self.metrics.read().await;
        StoreStats {
            hosts: metrics.len(),
            samples: metrics.values().map(VecDeque::len).sum(),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}
