//! Worker manifest (`worker.json`)

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::devices::{DeviceType, Metadata};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_COMMAND_POLL_MS: u64 = 3000;
const DEFAULT_HEALTH: u8 = 95;
const DEFAULT_ALERT_AFTER: u32 = 5;

/// Description of the device a worker represents
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerManifest {
    /// Human-readable worker name
    pub name: String,

    /// Registry ID of the device; replaced by the assigned ID when
    /// `auto_register` is set
    #[serde(default)]
    pub device_id: String,

    /// Site the device belongs to
    pub site: String,

    pub heartbeat_interval_ms: u64,

    pub telemetry_interval_ms: u64,

    #[serde(default = "default_command_poll_ms")]
    pub command_poll_interval_ms: u64,

    #[serde(default = "default_device_type")]
    pub device_type: DeviceType,

    /// Registry base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Register the device on startup instead of assuming it exists
    #[serde(default)]
    pub auto_register: bool,

    /// Health reported with each heartbeat
    #[serde(default = "default_health")]
    pub health: u8,

    /// Metadata patch sent with each heartbeat
    #[serde(default)]
    pub metadata: Metadata,

    /// Fields sent with each telemetry push
    #[serde(default)]
    pub telemetry: Metadata,

    /// Consecutive failed ticks before an action raises an alert
    #[serde(default = "default_alert_after")]
    pub alert_after_failures: u32,
}

fn default_command_poll_ms() -> u64 {
    DEFAULT_COMMAND_POLL_MS
}

fn default_device_type() -> DeviceType {
    DeviceType::Radio
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_health() -> u8 {
    DEFAULT_HEALTH
}

fn default_alert_after() -> u32 {
    DEFAULT_ALERT_AFTER
}

impl WorkerManifest {
    /// Load and validate a manifest file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read manifest {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate manifest JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or a value is out of range
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() && !self.auto_register {
            return Err(Error::Config(
                "manifest deviceId is empty and autoRegister is off".to_string(),
            ));
        }
        if self.site.trim().is_empty() {
            return Err(Error::Config("manifest site is empty".to_string()));
        }
        for (field, value) in [
            ("heartbeatIntervalMs", self.heartbeat_interval_ms),
            ("telemetryIntervalMs", self.telemetry_interval_ms),
            ("commandPollIntervalMs", self.command_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("manifest {field} must be positive")));
            }
        }
        if self.health > 100 {
            return Err(Error::Config(format!(
                "manifest health {} is outside 0-100",
                self.health
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub const fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    #[must_use]
    pub const fn command_poll_interval(&self) -> Duration {
        Duration::from_millis(self.command_poll_interval_ms)
    }
}
