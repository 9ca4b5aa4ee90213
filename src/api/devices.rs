//! Device API endpoints
//!
//! Registration, heartbeats, the status projection, telemetry and the
//! per-device command queue, all over the single device registry.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use super::ApiState;
use super::error::{ApiError, JsonBody, PathParams, QueryParams, timestamp};
use crate::Result;
use crate::devices::{
    Command, CommandAck, Device, DeviceFilter, DeviceRegistry, DeviceStatus, DeviceStatusView,
    DeviceType, HeartbeatUpdate, Metadata, NewCommand, RegisterDevice, TelemetrySample,
};

/// Shared device registry
pub type SharedDeviceRegistry = Arc<Mutex<DeviceRegistry>>;

/// List filters exactly as supplied in the query string
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DeviceQuery {
    #[serde(rename = "type")]
    pub device_type: Option<String>,
    pub site_id: Option<String>,
    pub status: Option<String>,
}

impl DeviceQuery {
    /// Convert to a registry filter; empty values are ignored
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown type or status
    pub fn to_filter(&self) -> Result<DeviceFilter> {
        Ok(DeviceFilter {
            device_type: present(self.device_type.as_deref()).map(DeviceType::parse).transpose()?,
            site_id: present(self.site_id.as_deref()).map(ToString::to_string),
            status: present(self.status.as_deref()).map(DeviceStatus::parse).transpose()?,
        })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    #[serde(default)]
    status: Option<Value>,
}

#[derive(Serialize)]
struct DeviceListResponse {
    devices: Vec<Device>,
    count: usize,
    filters: DeviceQuery,
    timestamp: String,
}

#[derive(Serialize)]
struct DeviceResponse {
    device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    timestamp: String,
}

impl DeviceResponse {
    fn new(device: Device, message: Option<&str>) -> Self {
        Self {
            device,
            message: message.map(ToString::to_string),
            timestamp: timestamp(),
        }
    }
}

#[derive(Serialize)]
struct StatusListResponse {
    device_statuses: Vec<DeviceStatusView>,
    count: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct StatusResponse {
    device_status: DeviceStatusView,
    message: String,
    timestamp: String,
}

#[derive(Serialize)]
struct TelemetryResponse {
    telemetry: TelemetrySample,
    timestamp: String,
}

#[derive(Serialize)]
struct TelemetryListResponse {
    telemetry: Vec<TelemetrySample>,
    count: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct CommandResponse {
    command: Command,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    timestamp: String,
}

#[derive(Serialize)]
struct CommandListResponse {
    commands: Vec<Command>,
    count: usize,
    timestamp: String,
}

/// Build device routes
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_devices).post(register_device))
        .route("/status", get(list_statuses))
        .route("/status/{device_id}/status", put(set_status))
        .route("/{device_id}", get(get_device).delete(deregister_device))
        .route("/{device_id}/heartbeat", put(heartbeat))
        .route("/{device_id}/telemetry", get(list_telemetry).post(record_telemetry))
        .route("/{device_id}/commands", get(list_commands).post(enqueue_command))
        .route("/{device_id}/commands/{command_id}/ack", post(acknowledge_command))
        .with_state(state)
}

/// List devices, optionally filtered
async fn list_devices(
    State(state): State<Arc<ApiState>>,
    QueryParams(query): QueryParams<DeviceQuery>,
) -> std::result::Result<Json<DeviceListResponse>, ApiError> {
    let filter = query.to_filter()?;
    let devices: Vec<Device> = state
        .devices
        .lock()
        .await
        .list(&filter)
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(DeviceListResponse {
        count: devices.len(),
        devices,
        filters: query,
        timestamp: timestamp(),
    }))
}

/// Register a new device
async fn register_device(
    State(state): State<Arc<ApiState>>,
    JsonBody(request): JsonBody<RegisterDevice>,
) -> std::result::Result<(StatusCode, Json<DeviceResponse>), ApiError> {
    let (device, count) = {
        let mut registry = state.devices.lock().await;
        let device = registry.register(request)?;
        (device, registry.len())
    };
    state.metrics.set_devices(count);

    tracing::info!(
        device_id = %device.id,
        device_type = %device.device_type,
        site_id = %device.site_id,
        "device registered"
    );

    Ok((
        StatusCode::CREATED,
        Json(DeviceResponse::new(device, Some("Device registered successfully"))),
    ))
}

/// Get a single device
async fn get_device(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
) -> std::result::Result<Json<DeviceResponse>, ApiError> {
    let device = state.devices.lock().await.get(&device_id)?.clone();
    Ok(Json(DeviceResponse::new(device, None)))
}

/// Apply a device heartbeat
async fn heartbeat(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
    JsonBody(update): JsonBody<HeartbeatUpdate>,
) -> std::result::Result<Json<DeviceResponse>, ApiError> {
    let device = state
        .devices
        .lock()
        .await
        .heartbeat(&device_id, update)?
        .clone();
    state.metrics.heartbeat_accepted();

    tracing::debug!(
        device_id = %device.id,
        status = %device.status,
        health = device.health.value(),
        "heartbeat received"
    );

    Ok(Json(DeviceResponse::new(device, Some("Heartbeat received"))))
}

/// Deregister a device
async fn deregister_device(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
) -> std::result::Result<Json<DeviceResponse>, ApiError> {
    let (device, count) = {
        let mut registry = state.devices.lock().await;
        let device = registry.deregister(&device_id)?;
        (device, registry.len())
    };
    state.metrics.set_devices(count);

    tracing::info!(device_id = %device.id, "device deregistered");

    Ok(Json(DeviceResponse::new(
        device,
        Some("Device deregistered successfully"),
    )))
}

/// Status projection of every device
async fn list_statuses(State(state): State<Arc<ApiState>>) -> Json<StatusListResponse> {
    let statuses = state.devices.lock().await.statuses();

    Json(StatusListResponse {
        count: statuses.len(),
        device_statuses: statuses,
        timestamp: timestamp(),
    })
}

/// Overwrite the status of one device
async fn set_status(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> std::result::Result<Json<StatusResponse>, ApiError> {
    // Non-string values are treated the same as a missing status
    let status = update.status.as_ref().and_then(Value::as_str);
    let view = state.devices.lock().await.set_status(&device_id, status)?;

    tracing::info!(device_id = %device_id, status = %view.status, "device status updated");

    Ok(Json(StatusResponse {
        message: format!("Device {device_id} status updated to {}", view.status),
        device_status: view,
        timestamp: timestamp(),
    }))
}

/// Accept a telemetry report
async fn record_telemetry(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
    JsonBody(data): JsonBody<Metadata>,
) -> std::result::Result<(StatusCode, Json<TelemetryResponse>), ApiError> {
    let sample = state
        .devices
        .lock()
        .await
        .record_telemetry(&device_id, data)?;
    state.metrics.telemetry_accepted();

    tracing::debug!(device_id = %device_id, fields = sample.data.len(), "telemetry received");

    Ok((
        StatusCode::CREATED,
        Json(TelemetryResponse {
            telemetry: sample,
            timestamp: timestamp(),
        }),
    ))
}

/// Retained telemetry for a device
async fn list_telemetry(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
) -> std::result::Result<Json<TelemetryListResponse>, ApiError> {
    let samples: Vec<TelemetrySample> = state
        .devices
        .lock()
        .await
        .telemetry(&device_id)?
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(TelemetryListResponse {
        count: samples.len(),
        telemetry: samples,
        timestamp: timestamp(),
    }))
}

/// Commands waiting for the device to pull
async fn list_commands(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
) -> std::result::Result<Json<CommandListResponse>, ApiError> {
    let commands: Vec<Command> = state
        .devices
        .lock()
        .await
        .pending_commands(&device_id)?
        .into_iter()
        .cloned()
        .collect();

    Ok(Json(CommandListResponse {
        count: commands.len(),
        commands,
        timestamp: timestamp(),
    }))
}

/// Queue a command for a device
async fn enqueue_command(
    State(state): State<Arc<ApiState>>,
    PathParams(device_id): PathParams<String>,
    JsonBody(request): JsonBody<NewCommand>,
) -> std::result::Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let command = state
        .devices
        .lock()
        .await
        .enqueue_command(&device_id, request)?;
    state.metrics.command_event("queued");

    tracing::info!(
        device_id = %device_id,
        command_id = %command.id,
        command_type = %command.command_type,
        "command queued"
    );

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse {
            command,
            message: None,
            timestamp: timestamp(),
        }),
    ))
}

/// Acknowledge a pulled command
async fn acknowledge_command(
    State(state): State<Arc<ApiState>>,
    PathParams((device_id, command_id)): PathParams<(String, String)>,
    JsonBody(ack): JsonBody<CommandAck>,
) -> std::result::Result<Json<CommandResponse>, ApiError> {
    let command = state
        .devices
        .lock()
        .await
        .acknowledge_command(&device_id, &command_id, ack)?;
    state.metrics.command_event(command.status.as_str());

    tracing::info!(
        device_id = %device_id,
        command_id = %command.id,
        status = command.status.as_str(),
        "command acknowledged"
    );

    Ok(Json(CommandResponse {
        message: Some(format!(
            "Command {} acknowledged as {}",
            command.id,
            command.status.as_str()
        )),
        command,
        timestamp: timestamp(),
    }))
}
