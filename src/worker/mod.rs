//! Device worker
//!
//! Represents one physical device: on independent timers it sends
//! heartbeats, pushes telemetry and pulls queued commands from the registry.
//! Commands are acknowledged as completed without being executed.

pub mod client;
pub mod manifest;
pub mod retry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::devices::{CommandAck, HeartbeatUpdate, RegisterDevice};
use crate::{Error, Result};

pub use client::RegistryClient;
pub use manifest::WorkerManifest;
pub use retry::RetryPolicy;

/// Periodic worker action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Heartbeat,
    Telemetry,
    CommandPoll,
}

impl Action {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Telemetry => "telemetry",
            Self::CommandPoll => "command_poll",
        }
    }
}

/// Tracks consecutive failed ticks of one action
///
/// Raises a single alert once the threshold is reached and stays quiet until
/// a success resets it.
#[derive(Debug)]
pub struct FailureTracker {
    alert_after: u32,
    consecutive: u32,
    alerted: bool,
}

impl FailureTracker {
    #[must_use]
    pub const fn new(alert_after: u32) -> Self {
        Self {
            alert_after,
            consecutive: 0,
            alerted: false,
        }
    }

    /// Number of failures since the last success
    #[must_use]
    pub const fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self, action: Action) {
        if self.alerted {
            tracing::info!(
                action = action.as_str(),
                failures = self.consecutive,
                "action recovered"
            );
        }
        self.consecutive = 0;
        self.alerted = false;
    }

    /// Record a failed tick; returns true when this failure raised the alert
    pub fn record_failure(&mut self, action: Action, err: &Error) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        tracing::warn!(
            action = action.as_str(),
            consecutive = self.consecutive,
            error = %err,
            "worker action failed"
        );

        if self.alerted || self.alert_after == 0 || self.consecutive < self.alert_after {
            return false;
        }
        self.alerted = true;
        tracing::error!(
            action = action.as_str(),
            consecutive = self.consecutive,
            "worker action failing repeatedly"
        );
        true
    }
}

/// Shared, immutable state of a running worker
#[derive(Debug)]
struct WorkerContext {
    client: RegistryClient,
    manifest: WorkerManifest,
    device_id: String,
    retry: RetryPolicy,
}

impl WorkerContext {
    async fn perform(&self, action: Action) -> Result<()> {
        match action {
            Action::Heartbeat => self.heartbeat().await,
            Action::Telemetry => self.telemetry().await,
            Action::CommandPoll => self.poll_commands().await,
        }
    }

    async fn heartbeat(&self) -> Result<()> {
        let update = HeartbeatUpdate {
            status: Some("online".to_string()),
            health: Some(i64::from(self.manifest.health)),
            metadata: (!self.manifest.metadata.is_empty()).then(|| self.manifest.metadata.clone()),
        };
        self.client.heartbeat(&self.device_id, &update).await?;
        tracing::debug!(device_id = %self.device_id, "heartbeat sent");
        Ok(())
    }

    async fn telemetry(&self) -> Result<()> {
        let mut data = self.manifest.telemetry.clone();
        data.insert(
            "timestamp".to_string(),
            Utc::now()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );
        self.client.push_telemetry(&self.device_id, &data).await?;
        tracing::debug!(device_id = %self.device_id, "telemetry sent");
        Ok(())
    }

    async fn poll_commands(&self) -> Result<()> {
        let commands = self.client.poll_commands(&self.device_id).await?;

        for command in commands {
            tracing::info!(
                device_id = %self.device_id,
                command_id = %command.id,
                command_type = %command.command_type,
                "command received"
            );

            let ack = CommandAck {
                status: Some("completed".to_string()),
                timestamp: Some(Utc::now()),
            };
            self.client
                .ack_command(&self.device_id, &command.id, &ack)
                .await?;

            tracing::info!(command_id = %command.id, "command acknowledged");
        }
        Ok(())
    }
}

/// Device worker
#[derive(Debug)]
pub struct Worker {
    manifest: WorkerManifest,
    client: RegistryClient,
    retry: RetryPolicy,
}

impl Worker {
    /// Create a worker for a manifest
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(manifest: WorkerManifest) -> Result<Self> {
        let client = RegistryClient::new(&manifest.base_url)?;
        Ok(Self {
            manifest,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error only if auto-registration fails; tick failures are
    /// logged and never end the worker
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let device_id = if self.manifest.auto_register {
            self.register().await?
        } else {
            self.manifest.device_id.clone()
        };

        tracing::info!(
            worker = %self.manifest.name,
            device_id = %device_id,
            site = %self.manifest.site,
            registry = %self.client.base_url(),
            "starting worker"
        );

        let schedule = [
            (Action::Heartbeat, self.manifest.heartbeat_interval()),
            (Action::Telemetry, self.manifest.telemetry_interval()),
            (Action::CommandPoll, self.manifest.command_poll_interval()),
        ];
        let alert_after = self.manifest.alert_after_failures;
        let ctx = Arc::new(WorkerContext {
            client: self.client,
            manifest: self.manifest,
            device_id,
            retry: self.retry,
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks: Vec<_> = schedule
            .into_iter()
            .map(|(action, period)| {
                tokio::spawn(run_periodic(
                    ctx.clone(),
                    action,
                    period,
                    alert_after,
                    stop_rx.clone(),
                ))
            })
            .collect();

        shutdown.await;
        tracing::info!("stopping worker");
        let _ = stop_tx.send(true);

        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "worker task ended abnormally");
            }
        }
        Ok(())
    }

    async fn register(&self) -> Result<String> {
        let request = RegisterDevice {
            device_type: Some(self.manifest.device_type.to_string()),
            site_id: Some(self.manifest.site.clone()),
            metadata: Some(self.manifest.metadata.clone()),
        };
        let device = retry::with_retry(&self.retry, "register", || {
            self.client.register(&request)
        })
        .await?;

        tracing::info!(device_id = %device.id, "device registered");
        Ok(device.id)
    }
}

/// Run one action every `period` until stopped; missed ticks are skipped
async fn run_periodic(
    ctx: Arc<WorkerContext>,
    action: Action,
    period: Duration,
    alert_after: u32,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures = FailureTracker::new(alert_after);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {
                // A stop request abandons the tick, including pending retries
                let work = retry::with_retry(&ctx.retry, action.as_str(), || ctx.perform(action));
                let result = tokio::select! {
                    _ = stop.changed() => break,
                    result = work => result,
                };
                match result {
                    Ok(()) => failures.record_success(action),
                    Err(e) => {
                        failures.record_failure(action, &e);
                    }
                }
            }
        }
    }

    tracing::debug!(action = action.as_str(), "worker task stopped");
}
