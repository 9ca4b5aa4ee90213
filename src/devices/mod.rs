//! Device registry for federated infrastructure
//!
//! Devices are registered administratively, then report liveness through
//! heartbeats, push telemetry and pull queued commands

pub mod registry;
pub mod types;

use chrono::Utc;
use serde_json::json;

pub use registry::{DeviceRegistry, RegistryLimits};
pub use types::{
    Command, CommandAck, CommandStatus, Device, DeviceFilter, DeviceStatus, DeviceStatusView,
    DeviceType, Health, HeartbeatUpdate, Metadata, NewCommand, RegisterDevice, TelemetrySample,
};

/// Devices present on the demo site
#[must_use]
pub fn demo_devices() -> Vec<Device> {
    let now = Utc::now();
    let metadata = |value: serde_json::Value| match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    };

    vec![
        Device {
            id: "dev_radio_001".to_string(),
            device_type: DeviceType::Radio,
            site_id: "site_alpha".to_string(),
            status: DeviceStatus::Online,
            health: Health::try_from(98).unwrap_or_default(),
            last_seen: now,
            metadata: metadata(json!({
                "frequency_band": "CBRS",
                "tx_power_dbm": 20,
                "sas_grant_id": "grant_abc123",
            })),
        },
        Device {
            id: "dev_gpu_001".to_string(),
            device_type: DeviceType::Compute,
            site_id: "site_alpha".to_string(),
            status: DeviceStatus::Online,
            health: Health::try_from(95).unwrap_or_default(),
            last_seen: now,
            metadata: metadata(json!({
                "gpu_model": "NVIDIA A100",
                "mig_slices": 7,
                "utilization_pct": 42,
            })),
        },
    ]
}
