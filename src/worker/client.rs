//! HTTP client for the registry API

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::retry::parse_retry_after;
use crate::devices::{Command, CommandAck, Device, HeartbeatUpdate, Metadata, RegisterDevice};
use crate::{Error, Result};

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct DeviceEnvelope {
    device: Device,
}

#[derive(Debug, Deserialize)]
struct CommandEnvelope {
    command: Command,
}

#[derive(Debug, Deserialize)]
struct CommandListEnvelope {
    #[serde(default)]
    commands: Vec<Command>,
}

/// Client for the device endpoints a worker drives
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    client: reqwest::Client,
}

impl RegistryClient {
    /// Create a new registry client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register a device and return it with its assigned ID
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the registry rejects it
    pub async fn register(&self, request: &RegisterDevice) -> Result<Device> {
        let url = format!("{}/devices", self.base_url);
        let envelope: DeviceEnvelope = send(self.client.post(url).json(request)).await?;
        Ok(envelope.device)
    }

    /// Send a heartbeat
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the registry rejects it
    pub async fn heartbeat(&self, device_id: &str, update: &HeartbeatUpdate) -> Result<Device> {
        let url = format!("{}/devices/{device_id}/heartbeat", self.base_url);
        let envelope: DeviceEnvelope = send(self.client.put(url).json(update)).await?;
        Ok(envelope.device)
    }

    /// Push one telemetry report
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the registry rejects it
    pub async fn push_telemetry(&self, device_id: &str, data: &Metadata) -> Result<()> {
        let url = format!("{}/devices/{device_id}/telemetry", self.base_url);
        let _: serde_json::Value = send(self.client.post(url).json(data)).await?;
        Ok(())
    }

    /// Fetch commands waiting for the device
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the registry rejects it
    pub async fn poll_commands(&self, device_id: &str) -> Result<Vec<Command>> {
        let url = format!("{}/devices/{device_id}/commands", self.base_url);
        let envelope: CommandListEnvelope = send(self.client.get(url)).await?;
        Ok(envelope.commands)
    }

    /// Acknowledge a pulled command
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the registry rejects it
    pub async fn ack_command(
        &self,
        device_id: &str,
        command_id: &str,
        ack: &CommandAck,
    ) -> Result<Command> {
        let url = format!(
            "{}/devices/{device_id}/commands/{command_id}/ack",
            self.base_url
        );
        let envelope: CommandEnvelope = send(self.client.post(url).json(ack)).await?;
        Ok(envelope.command)
    }
}

/// Send a request and decode a success body; other statuses become `Upstream`
async fn send<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Upstream {
            status: status.as_u16(),
            body,
            retry_after,
        });
    }

    Ok(response.json().await?)
}
