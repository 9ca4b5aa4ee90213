//! Device registry types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Open-ended, type-specific device attributes
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Kind of infrastructure a device represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Radio,
    Compute,
    Backhaul,
    Power,
    Storage,
}

impl DeviceType {
    /// Every accepted device type, in wire form
    pub const ALL: [Self; 5] = [
        Self::Radio,
        Self::Compute,
        Self::Backhaul,
        Self::Power,
        Self::Storage,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Radio => "radio",
            Self::Compute => "compute",
            Self::Backhaul => "backhaul",
            Self::Power => "power",
            Self::Storage => "storage",
        }
    }

    /// Parse the wire form
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeviceType` for anything outside the fixed set
    pub fn parse(raw: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == raw)
            .ok_or_else(|| Error::InvalidDeviceType(raw.to_string()))
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reachability of a device as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    Degraded,
}

impl DeviceStatus {
    pub const ALL: [Self; 3] = [Self::Online, Self::Offline, Self::Degraded];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Degraded => "degraded",
        }
    }

    /// Parse the wire form
    ///
    /// # Errors
    ///
    /// Returns `InvalidStatus` for anything outside the fixed set
    pub fn parse(raw: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == raw)
            .ok_or_else(|| Error::InvalidStatus(raw.to_string()))
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device health score, always within 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Health(u8);

impl Health {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(100);

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Health {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX.0)
            .map(Self)
            .ok_or(Error::InvalidHealth(value))
    }
}

impl From<Health> for u8 {
    fn from(health: Health) -> Self {
        health.0
    }
}

/// A registered infrastructure device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub site_id: String,
    pub status: DeviceStatus,
    pub health: Health,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Status-only projection of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusView {
    pub id: String,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
}

impl From<&Device> for DeviceStatusView {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            status: device.status,
            last_seen: device.last_seen,
        }
    }
}

/// Registration request as received from a caller
///
/// Fields are loose on purpose so presence and membership checks report
/// validation errors rather than decode failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterDevice {
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Heartbeat update; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// List filter; `None` matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub device_type: Option<DeviceType>,
    pub site_id: Option<String>,
    pub status: Option<DeviceStatus>,
}

impl DeviceFilter {
    #[must_use]
    pub fn matches(&self, device: &Device) -> bool {
        self.device_type.is_none_or(|t| t == device.device_type)
            && self
                .site_id
                .as_deref()
                .is_none_or(|s| s == device.site_id)
            && self.status.is_none_or(|s| s == device.status)
    }
}

/// A telemetry report retained for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub device_id: String,
    pub received_at: DateTime<Utc>,
    pub data: Metadata,
}

/// Lifecycle of a queued command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Completed,
    Failed,
}

impl CommandStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse an acknowledgement status; only terminal states are accepted
    ///
    /// # Errors
    ///
    /// Returns `InvalidCommandStatus` for `pending` or unknown values
    pub fn parse_terminal(raw: &str) -> Result<Self> {
        match raw {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidCommandStatus(other.to_string())),
        }
    }
}

/// A command queued for a device to pull
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub device_id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Request to queue a command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCommand {
    #[serde(rename = "type", default)]
    pub command_type: Option<String>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// Acknowledgement sent by a worker after pulling a command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_parses_wire_names() {
        assert_eq!(DeviceType::parse("radio").unwrap(), DeviceType::Radio);
        assert_eq!(DeviceType::parse("storage").unwrap(), DeviceType::Storage);
        assert!(matches!(
            DeviceType::parse("balloon"),
            Err(Error::InvalidDeviceType(t)) if t == "balloon"
        ));
        assert!(DeviceType::parse("Radio").is_err());
    }

    #[test]
    fn status_parses_wire_names() {
        assert_eq!(DeviceStatus::parse("degraded").unwrap(), DeviceStatus::Degraded);
        assert!(DeviceStatus::parse("exploding").is_err());
    }

    #[test]
    fn health_bounds() {
        assert_eq!(Health::try_from(0).unwrap(), Health::MIN);
        assert_eq!(Health::try_from(100).unwrap(), Health::MAX);
        assert!(matches!(Health::try_from(101), Err(Error::InvalidHealth(101))));
        assert!(matches!(Health::try_from(-1), Err(Error::InvalidHealth(-1))));
    }

    #[test]
    fn health_rejects_out_of_range_json() {
        let ok: Health = serde_json::from_str("90").unwrap();
        assert_eq!(ok.value(), 90);
        assert!(serde_json::from_str::<Health>("150").is_err());
    }

    #[test]
    fn device_serializes_type_key() {
        let device = Device {
            id: "dev_radio_1".to_string(),
            device_type: DeviceType::Radio,
            site_id: "s1".to_string(),
            status: DeviceStatus::Offline,
            health: Health::MIN,
            last_seen: Utc::now(),
            metadata: Metadata::new(),
        };
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["type"], "radio");
        assert_eq!(json["status"], "offline");
        assert_eq!(json["health"], 0);
    }

    #[test]
    fn filter_is_conjunctive() {
        let device = Device {
            id: "dev_compute_1".to_string(),
            device_type: DeviceType::Compute,
            site_id: "site_alpha".to_string(),
            status: DeviceStatus::Online,
            health: Health::MAX,
            last_seen: Utc::now(),
            metadata: Metadata::new(),
        };

        assert!(DeviceFilter::default().matches(&device));
        assert!(DeviceFilter {
            device_type: Some(DeviceType::Compute),
            site_id: Some("site_alpha".to_string()),
            status: None,
        }
        .matches(&device));
        assert!(!DeviceFilter {
            device_type: Some(DeviceType::Compute),
            site_id: Some("site_beta".to_string()),
            status: None,
        }
        .matches(&device));
    }

    #[test]
    fn ack_status_rejects_pending() {
        assert_eq!(
            CommandStatus::parse_terminal("failed").unwrap(),
            CommandStatus::Failed
        );
        assert!(CommandStatus::parse_terminal("pending").is_err());
    }
}
