//! InfraFlow Federated Access - device and account registry
//!
//! This library provides:
//! - An in-memory registry of infrastructure devices (radios, compute,
//!   backhaul, power, storage) with heartbeats, telemetry and command queues
//! - An account registry with placeholder decentralized identifiers
//! - The HTTP API exposing both
//! - A worker client that drives the API on behalf of one physical device
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   HTTP    ┌──────────────────────────────────┐
//! │    Worker    │ ────────▶ │            API (axum)            │
//! │ hb │ tel │ cmd│          │  devices │ accounts │ health     │
//! └──────────────┘           └───────────────┬──────────────────┘
//!                                            │ Arc<Mutex<_>>
//!                            ┌───────────────▼──────────────────┐
//!                            │  DeviceRegistry │ AccountRegistry │
//!                            └──────────────────────────────────┘
//! ```

pub mod accounts;
pub mod api;
pub mod config;
pub mod devices;
pub mod error;
pub mod metrics;
pub mod worker;

pub use accounts::{Account, AccountRegistry};
pub use api::{ApiServer, ApiState, build_router};
pub use config::{Config, Environment};
pub use devices::{Device, DeviceRegistry, DeviceStatus, DeviceType};
pub use error::{Error, ErrorKind, Result};
pub use metrics::Metrics;
pub use worker::{Worker, WorkerManifest};
