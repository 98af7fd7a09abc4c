//! Host directory: which agents exist and whether they are still reporting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{ClusterId, FleetError, FleetResult, HostId};

/// Host known before its first heartbeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRegistration {
    pub id: HostId,

    #[serde(default)]
    pub hostname: Option<String>,

    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub id: HostId,
    pub hostname: Option<String>,
    pub cluster_id: Option<ClusterId>,
    pub agent_version: Option<String>,
    pub status: HostStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl HostRecord {
    fn registered(registration: HostRegistration) -> Self {
        Self {
            id: registration.id,
            hostname: registration.hostname,
            cluster_id: registration.cluster_id,
            agent_version: None,
            status: HostStatus::Offline,
            last_heartbeat: None,
        }
    }
}

#[derive(Debug)]
pub struct HostDirectory {
    hosts: RwLock<BTreeMap<HostId, HostRecord>>,

    /// Reject heartbeats from hosts that were never registered
    strict: bool,
}

impl HostDirectory {
    pub fn new(strict: bool) -> Self {
        Self {
            hosts: RwLock::new(BTreeMap::new()),
            strict,
        }
    }

    /// Register a host; an existing record keeps its liveness state.
    pub async fn register(&self, registration: HostRegistration) -> FleetResult<HostRecord> {
        if registration.id == 0 {
            return Err(FleetError::InvalidInput("host id must be non-zero".into()));
        }

        let mut hosts = self.hosts.write().await;
        let record = hosts
            .entry(registration.id)
            .and_modify(|record| {
                if registration.hostname.is_some() {
                    record.hostname = registration.hostname.clone();
                }
                if registration.cluster_id.is_some() {
                    record.cluster_id = registration.cluster_id;
                }
            })
            .or_insert_with(|| HostRecord::registered(registration.clone()));

        info!("registered host {}", record.id);
        Ok(record.clone())
    }

    /// Record a heartbeat and mark the host online.
    pub async fn touch(
        &self,
        host_id: HostId,
        hostname: Option<&str>,
        agent_version: Option<&str>,
        at: DateTime<Utc>,
    ) -> FleetResult<HostRecord> {
        let mut hosts = self.hosts.write().await;

        if self.strict && !hosts.contains_key(&host_id) {
            warn!("rejecting heartbeat from unregistered host {host_id}");
            return Err(FleetError::not_found("host", host_id));
        }

        let record = hosts.entry(host_id).or_insert_with(|| {
            info!("host {host_id} registered by first heartbeat");
            HostRecord::registered(HostRegistration {
                id: host_id,
                hostname: None,
                cluster_id: None,
            })
        });

        if record.status == HostStatus::Offline {
            info!("host {host_id} is online");
        }

        record.status = HostStatus::Online;
        record.last_heartbeat = Some(at);
        if let Some(hostname) = hostname {
            record.hostname = Some(hostname.to_string());
        }
        if let Some(version) = agent_version {
            record.agent_version = Some(version.to_string());
        }

        Ok(record.clone())
    }

    /// Mark online hosts without a heartbeat since `cutoff` as offline.
    pub async fn mark_stale(&self, cutoff: DateTime<Utc>) -> Vec<HostId> {
        let mut hosts = self.hosts.write().await;
        let mut stale = Vec::new();

        for record in hosts.values_mut() {
            let expired = record.last_heartbeat.is_none_or(|seen| seen < cutoff);
            if record.status == HostStatus::Online && expired {
                record.status = HostStatus::Offline;
                stale.push(record.id);
            }
        }

        if !stale.is_empty() {
            warn!("hosts went offline: {stale:?}");
        } else {
            debug!("all online hosts reported since {cutoff}");
        }
        stale
    }

    pub async fn get(&self, host_id: HostId) -> FleetResult<HostRecord> {
        self.hosts
            .read()
            .await
            .get(&host_id)
            .cloned()
            .ok_or_else(|| FleetError::not_found("host", host_id))
    }

    pub async fn list(&self) -> Vec<HostRecord> {
        self.hosts.read().await.values().cloned().collect()
    }
}
