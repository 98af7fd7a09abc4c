//! Metric intake: the control plane side of the heartbeat protocol
//!
//! A heartbeat marks the host online, stores its samples, records component states, runs every
//! sample through the alert evaluator in arrival order, and returns the commands queued for that
//! host.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::alerting::{AlertEvaluator, MetricObservation};
use crate::command::{CommandChannel, ResultSender};
use crate::deploy::DeploymentRegistry;
use crate::hosts::HostDirectory;
use crate::storage::MetricStore;
use crate::{
    AgentCommandResponse, FleetError, FleetResult, HeartbeatRequest, HeartbeatResponse,
};

pub struct MetricIntake {
    hosts: Arc<HostDirectory>,
    metrics: Arc<dyn MetricStore>,
    registry: Arc<DeploymentRegistry>,
    evaluator: Arc<AlertEvaluator>,
    commands: CommandChannel,
    results: ResultSender,
    max_commands_per_heartbeat: usize,
}

impl MetricIntake {
    pub fn new(
        hosts: Arc<HostDirectory>,
        metrics: Arc<dyn MetricStore>,
        registry: Arc<DeploymentRegistry>,
        evaluator: Arc<AlertEvaluator>,
        commands: CommandChannel,
        results: ResultSender,
        max_commands_per_heartbeat: usize,
    ) -> Self {
        Self {
            hosts,
            metrics,
            registry,
            evaluator,
            commands,
            results,
            max_commands_per_heartbeat: max_commands_per_heartbeat.max(1),
        }
    }

    #[instrument(skip(self, request), fields(host_id = request.host_id))]
    pub async fn handle_heartbeat(&self, request: HeartbeatRequest) -> FleetResult<HeartbeatResponse> {
        if request.host_id == 0 {
            return Err(FleetError::InvalidInput("host id must be non-zero".into()));
        }

        let received_at = Utc::now();
        let host = self
            .hosts
            .touch(
                request.host_id,
                request.hostname.as_deref(),
                request.agent_version.as_deref(),
                received_at,
            )
            .await?;

        let (samples, dropped): (Vec<_>, Vec<_>) = request
            .samples()
            .into_iter()
            .partition(|sample| sample.value.is_finite());
        if !dropped.is_empty() {
            warn!("dropping {} non-finite samples", dropped.len());
        }

        if let Err(e) = self.metrics.append(host.id, &samples).await {
            warn!("failed to store metrics: {e}");
        }

        self.registry
            .update_component_status(host.id, &request.components, received_at)
            .await;

        let mut opened = 0;
        for sample in &samples {
            let observation =
                MetricObservation::from_sample(host.id, host.hostname.clone(), host.cluster_id, sample);
            opened += self.evaluator.process_metric(&observation).await.len();
        }

        let commands = self
            .commands
            .take_for_host(host.id, self.max_commands_per_heartbeat);

        debug!(
            "heartbeat: {} samples, {} components, {opened} alerts opened, {} commands returned",
            samples.len(),
            request.components.len(),
            commands.len()
        );

        Ok(HeartbeatResponse {
            timestamp: received_at,
            commands,
        })
    }

    /// Queue a command result for the result processor.
    pub fn handle_command_result(&self, response: AgentCommandResponse) -> FleetResult<()> {
        if response.command_id.trim().is_empty() {
            return Err(FleetError::InvalidInput("command id must not be empty".into()));
        }

        debug!(
            "result for {}: success={} ({})",
            response.command_id, response.success, response.message
        );
        self.results.send(response)
    }
}
