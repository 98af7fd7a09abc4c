use std::time::Duration;

use reqwest::Client;
use tracing::{instrument, trace};

use crate::util::normalize_base_url;
use crate::{AgentCommandResponse, FleetError, FleetResult, HeartbeatRequest, HeartbeatResponse};

pub const HEARTBEAT_PATH: &str = "/api/v1/agent/heartbeat";
pub const COMMAND_RESULT_PATH: &str = "/api/v1/agent/command-result";

/// HTTP client for the hub's agent endpoints
///
/// Every request carries the configured timeout.
#[derive(Debug, Clone)]
pub struct HubClient {
    client: Client,
    base_url: String,
}

impl HubClient {
    pub fn new(base_url: &str, timeout: Duration) -> FleetResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    #[instrument(skip(self, request), fields(host_id = request.host_id))]
    pub async fn heartbeat(&self, request: &HeartbeatRequest) -> FleetResult<HeartbeatResponse> {
        let url = format!("{}{HEARTBEAT_PATH}", self.base_url);
        trace!("{url}: sending heartbeat");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FleetError::TransportFailure(format!(
                "heartbeat rejected with {status}: {body}"
            )));
        }

        Ok(response.json().await?)
    }

    #[instrument(skip(self, result), fields(command_id = %result.command_id))]
    pub async fn report(&self, result: &AgentCommandResponse) -> FleetResult<()> {
        let url = format!("{}{COMMAND_RESULT_PATH}", self.base_url);

        let response = self.client.post(&url).json(result).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FleetError::TransportFailure(format!(
                "command result rejected with {status}"
            )));
        }

        Ok(())
    }
}
