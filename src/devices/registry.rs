//! Device registry holding the authoritative device set
//!
//! Registration fixes identity and type; heartbeats are the only way live
//! status and measurements move.

use std::collections::VecDeque;

use chrono::Utc;
use indexmap::IndexMap;
use uuid::Uuid;

use super::types::{
    Command, CommandAck, CommandStatus, Device, DeviceFilter, DeviceStatus, DeviceStatusView,
    DeviceType, Health, HeartbeatUpdate, Metadata, NewCommand, RegisterDevice, TelemetrySample,
};
use crate::{Error, Result};

/// Default number of telemetry samples kept per device
pub const DEFAULT_TELEMETRY_RETENTION: usize = 100;

/// Default bound on queued commands per device
pub const DEFAULT_MAX_PENDING_COMMANDS: usize = 64;

/// Registry limits
#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub telemetry_retention: usize,
    pub max_pending_commands: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            telemetry_retention: DEFAULT_TELEMETRY_RETENTION,
            max_pending_commands: DEFAULT_MAX_PENDING_COMMANDS,
        }
    }
}

#[derive(Debug)]
struct DeviceEntry {
    device: Device,
    telemetry: VecDeque<TelemetrySample>,
    commands: VecDeque<Command>,
}

impl DeviceEntry {
    const fn new(device: Device) -> Self {
        Self {
            device,
            telemetry: VecDeque::new(),
            commands: VecDeque::new(),
        }
    }
}

/// Registry of infrastructure devices, in registration order
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: IndexMap<String, DeviceEntry>,
    limits: RegistryLimits,
    /// Last millisecond stamp handed out in an id
    last_stamp: i64,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(RegistryLimits::default())
    }

    /// Create a new empty registry with explicit limits
    #[must_use]
    pub fn with_limits(limits: RegistryLimits) -> Self {
        Self {
            devices: IndexMap::new(),
            limits,
            last_stamp: 0,
        }
    }

    /// Create a registry pre-populated with the demo site devices
    #[must_use]
    pub fn with_demo_devices(limits: RegistryLimits) -> Self {
        let mut registry = Self::with_limits(limits);
        for device in super::demo_devices() {
            registry
                .devices
                .insert(device.id.clone(), DeviceEntry::new(device));
        }
        registry
    }

    /// List devices matching every supplied filter field
    #[must_use]
    pub fn list(&self, filter: &DeviceFilter) -> Vec<&Device> {
        self.devices
            .values()
            .map(|e| &e.device)
            .filter(|d| filter.matches(d))
            .collect()
    }

    /// Register a new device
    ///
    /// The device starts `offline` with zero health until its first heartbeat.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `type` or `site_id` is missing or the
    /// type is unknown
    pub fn register(&mut self, request: RegisterDevice) -> Result<Device> {
        let device_type = non_empty(request.device_type.as_deref());
        let site_id = non_empty(request.site_id.as_deref());

        let (Some(device_type), Some(site_id)) = (device_type, site_id) else {
            return Err(Error::MissingFields(vec!["type", "site_id"]));
        };
        let device_type = DeviceType::parse(device_type)?;

        let stamp = self.next_stamp();
        let device = Device {
            id: format!("dev_{device_type}_{stamp}"),
            device_type,
            site_id: site_id.to_string(),
            status: DeviceStatus::Offline,
            health: Health::MIN,
            last_seen: Utc::now(),
            metadata: request.metadata.unwrap_or_default(),
        };

        self.devices
            .insert(device.id.clone(), DeviceEntry::new(device.clone()));
        Ok(device)
    }

    /// Get a device by ID
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device has that ID
    pub fn get(&self, device_id: &str) -> Result<&Device> {
        self.entry(device_id).map(|e| &e.device)
    }

    /// Apply a heartbeat
    ///
    /// Every supplied field is validated before any is applied, so a rejected
    /// heartbeat leaves the device untouched.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown ID, or a validation error for an
    /// unknown status or out-of-range health
    pub fn heartbeat(&mut self, device_id: &str, update: HeartbeatUpdate) -> Result<&Device> {
        let status = update.status.as_deref().map(DeviceStatus::parse).transpose()?;
        let health = update.health.map(Health::try_from).transpose()?;

        let device = &mut self.entry_mut(device_id)?.device;
        if let Some(status) = status {
            device.status = status;
        }
        if let Some(health) = health {
            device.health = health;
        }
        if let Some(patch) = update.metadata {
            device.metadata.extend(patch);
        }
        device.last_seen = Utc::now();

        Ok(device)
    }

    /// Deregister a device, discarding its telemetry and queued commands
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device has that ID
    pub fn deregister(&mut self, device_id: &str) -> Result<Device> {
        self.devices
            .shift_remove(device_id)
            .map(|e| e.device)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
    }

    /// Status projection of every device
    #[must_use]
    pub fn statuses(&self) -> Vec<DeviceStatusView> {
        self.devices
            .values()
            .map(|e| DeviceStatusView::from(&e.device))
            .collect()
    }

    /// Overwrite only the status of a device
    ///
    /// The status is checked before the lookup, so a bad status is reported
    /// even for an unknown device.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing or unknown status, then
    /// `DeviceNotFound` for an unknown ID
    pub fn set_status(&mut self, device_id: &str, status: Option<&str>) -> Result<DeviceStatusView> {
        let raw = non_empty(status).ok_or_else(|| Error::InvalidStatus(String::new()))?;
        let status = DeviceStatus::parse(raw)?;

        let device = &mut self.entry_mut(device_id)?.device;
        device.status = status;
        device.last_seen = Utc::now();

        Ok(DeviceStatusView::from(&*device))
    }

    /// Retain a telemetry report, evicting the oldest beyond the retention bound
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device has that ID
    pub fn record_telemetry(&mut self, device_id: &str, data: Metadata) -> Result<TelemetrySample> {
        let retention = self.limits.telemetry_retention;
        let entry = self.entry_mut(device_id)?;

        let sample = TelemetrySample {
            device_id: device_id.to_string(),
            received_at: Utc::now(),
            data,
        };
        entry.telemetry.push_back(sample.clone());
        while entry.telemetry.len() > retention {
            entry.telemetry.pop_front();
        }

        Ok(sample)
    }

    /// Retained telemetry for a device, oldest first
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device has that ID
    pub fn telemetry(&self, device_id: &str) -> Result<Vec<&TelemetrySample>> {
        Ok(self.entry(device_id)?.telemetry.iter().collect())
    }

    /// Queue a command for a device to pull
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown ID, `MissingFields` without a
    /// command type, or `CommandQueueFull` when the queue is at its bound
    pub fn enqueue_command(&mut self, device_id: &str, request: NewCommand) -> Result<Command> {
        let limit = self.limits.max_pending_commands;
        let entry = self.entry_mut(device_id)?;

        let Some(command_type) = non_empty(request.command_type.as_deref()) else {
            return Err(Error::MissingFields(vec!["type"]));
        };
        if entry.commands.len() >= limit {
            return Err(Error::CommandQueueFull {
                device_id: device_id.to_string(),
                limit,
            });
        }

        let command = Command {
            id: format!("cmd_{}", Uuid::new_v4()),
            device_id: device_id.to_string(),
            command_type: command_type.to_string(),
            params: request.params.unwrap_or(serde_json::Value::Null),
            status: CommandStatus::Pending,
            created_at: Utc::now(),
            acknowledged_at: None,
        };
        entry.commands.push_back(command.clone());

        Ok(command)
    }

    /// Commands awaiting acknowledgement, oldest first
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device has that ID
    pub fn pending_commands(&self, device_id: &str) -> Result<Vec<&Command>> {
        Ok(self.entry(device_id)?.commands.iter().collect())
    }

    /// Acknowledge a pulled command, removing it from the queue
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` or `CommandNotFound` for unknown IDs, or
    /// `InvalidCommandStatus` for a non-terminal status
    pub fn acknowledge_command(
        &mut self,
        device_id: &str,
        command_id: &str,
        ack: CommandAck,
    ) -> Result<Command> {
        let status = match non_empty(ack.status.as_deref()) {
            Some(raw) => CommandStatus::parse_terminal(raw)?,
            None => CommandStatus::Completed,
        };

        let entry = self.entry_mut(device_id)?;
        let position = entry
            .commands
            .iter()
            .position(|c| c.id == command_id)
            .ok_or_else(|| Error::CommandNotFound {
                device_id: device_id.to_string(),
                command_id: command_id.to_string(),
            })?;

        let mut command = entry
            .commands
            .remove(position)
            .ok_or_else(|| Error::Internal("command index out of bounds".to_string()))?;
        command.status = status;
        command.acknowledged_at = Some(ack.timestamp.unwrap_or_else(Utc::now));

        Ok(command)
    }

    /// Number of registered devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn entry(&self, device_id: &str) -> Result<&DeviceEntry> {
        self.devices
            .get(device_id)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
    }

    fn entry_mut(&mut self, device_id: &str) -> Result<&mut DeviceEntry> {
        self.devices
            .get_mut(device_id)
            .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
    }

    /// Millisecond stamp for a new ID, never repeating within this registry
    fn next_stamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }
}

/// The value as supplied, unless absent or blank
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
