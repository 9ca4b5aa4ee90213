//! Prometheus metrics for the registry service
//!
//! Metric names follow `infraflow_<area>_<metric>_<unit>`. The registry is
//! owned by the server state rather than held globally, so tests can build
//! isolated instances.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder, exponential_buckets,
};

use crate::Result;

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Service metrics
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
    devices: IntGauge,
    accounts: IntGauge,
    heartbeats: IntCounter,
    telemetry_samples: IntCounter,
    commands: IntCounterVec,
}

impl Metrics {
    /// Create and register all metrics
    ///
    /// # Errors
    ///
    /// Returns error if a metric definition is invalid or registered twice
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("infraflow_http_requests_total", "HTTP requests handled"),
            &["method", "route", "status"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new(
                "infraflow_http_request_duration_seconds",
                "HTTP request latency",
            )
            .buckets(exponential_buckets(0.0005, 2.0, 14)?),
            &["method", "route"],
        )?;
        let devices = IntGauge::new("infraflow_devices_registered", "Devices in the registry")?;
        let accounts = IntGauge::new("infraflow_accounts_registered", "Accounts in the registry")?;
        let heartbeats = IntCounter::new(
            "infraflow_device_heartbeats_total",
            "Device heartbeats accepted",
        )?;
        let telemetry_samples = IntCounter::new(
            "infraflow_telemetry_samples_total",
            "Telemetry samples accepted",
        )?;
        let commands = IntCounterVec::new(
            Opts::new("infraflow_commands_total", "Device command lifecycle events"),
            &["event"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(devices.clone()))?;
        registry.register(Box::new(accounts.clone()))?;
        registry.register(Box::new(heartbeats.clone()))?;
        registry.register(Box::new(telemetry_samples.clone()))?;
        registry.register(Box::new(commands.clone()))?;

        tracing::debug!("metrics registry initialized");

        Ok(Self {
            registry,
            http_requests,
            http_duration,
            devices,
            accounts,
            heartbeats,
            telemetry_samples,
            commands,
        })
    }

    /// Record one completed HTTP request
    pub fn record_request(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        self.http_requests
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
        self.http_duration
            .with_label_values(&[method, route])
            .observe(elapsed.as_secs_f64());
    }

    /// Set the current device count
    pub fn set_devices(&self, count: usize) {
        self.devices.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Set the current account count
    pub fn set_accounts(&self, count: usize) {
        self.accounts.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn heartbeat_accepted(&self) {
        self.heartbeats.inc();
    }

    pub fn telemetry_accepted(&self) {
        self.telemetry_samples.inc();
    }

    /// Count a command lifecycle event (`queued`, `completed`, `failed`)
    pub fn command_event(&self, event: &str) {
        self.commands.with_label_values(&[event]).inc();
    }

    /// Render all metrics in the Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Internal(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
