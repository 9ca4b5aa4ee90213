//! HTTP API server for the InfraFlow registry

pub mod accounts;
pub mod devices;
pub mod error;
pub mod health;
mod observe;

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::accounts::AccountRegistry;
use crate::config::{Config, Environment, ServerConfig};
use crate::devices::DeviceRegistry;
use crate::metrics::Metrics;
use crate::Result;

pub use accounts::SharedAccountRegistry;
pub use devices::SharedDeviceRegistry;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state for API handlers
#[derive(Debug, Clone)]
pub struct ApiState {
    pub devices: SharedDeviceRegistry,
    pub accounts: SharedAccountRegistry,
    pub metrics: Metrics,
    pub environment: Environment,
    pub started_at: Instant,
}

impl ApiState {
    /// Build state from configuration, seeding demo data if enabled
    ///
    /// # Errors
    ///
    /// Returns error if the metrics registry cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let limits = config.registry.limits();
        let (devices, accounts) = if config.registry.seed_demo_data {
            tracing::info!("seeding demo devices and account");
            (
                DeviceRegistry::with_demo_devices(limits),
                AccountRegistry::with_demo_account(),
            )
        } else {
            (DeviceRegistry::with_limits(limits), AccountRegistry::new())
        };

        Self::from_registries(devices, accounts, config.environment)
    }

    /// Build state around existing registries
    ///
    /// # Errors
    ///
    /// Returns error if the metrics registry cannot be created
    pub fn from_registries(
        devices: DeviceRegistry,
        accounts: AccountRegistry,
        environment: Environment,
    ) -> Result<Self> {
        let metrics = Metrics::new()?;
        metrics.set_devices(devices.len());
        metrics.set_accounts(accounts.len());

        Ok(Self {
            devices: Arc::new(Mutex::new(devices)),
            accounts: Arc::new(Mutex::new(accounts)),
            metrics,
            environment,
            started_at: Instant::now(),
        })
    }
}

/// Build the router with all routes and middleware
pub fn build_router(state: Arc<ApiState>) -> Router {
    let router = Router::new()
        .nest("/devices", devices::router(state.clone()))
        .nest("/accounts", accounts::router(state.clone()))
        .merge(health::router(state.clone()))
        .fallback(error::not_found)
        .method_not_allowed_fallback(error::not_found);

    // Panics become 500 envelopes before they reach logging and metrics
    let router = router
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            observe::observe_requests,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state,
            error::reveal_internal_errors,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router.layer(cors).layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    addr: String,
    shutdown_grace: Duration,
}

impl ApiServer {
    /// Create a server from configuration
    ///
    /// # Errors
    ///
    /// Returns error if state cannot be built
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_state(
            Arc::new(ApiState::new(config)?),
            &config.server,
        ))
    }

    /// Create a server around existing state
    #[must_use]
    pub fn with_state(state: Arc<ApiState>, server: &ServerConfig) -> Self {
        Self {
            state,
            addr: format!("{}:{}", server.host, server.port),
            shutdown_grace: server.shutdown_grace,
        }
    }

    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        self.state.clone()
    }

    /// Run until SIGINT or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            crate::Error::Config(format!("failed to bind API server on {}: {e}", self.addr))
        })?;

        tracing::info!(
            addr = %self.addr,
            environment = %self.state.environment,
            "API server listening"
        );

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an existing listener until `shutdown` resolves
    ///
    /// In-flight requests get the configured grace period to finish; any
    /// still open after it are dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the server fails
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (fired_tx, fired_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(async move {
                shutdown.await;
                let _ = fired_tx.send(());
            })
            .into_future();

        let grace = self.shutdown_grace;
        let deadline = async move {
            if fired_rx.await.is_ok() {
                tracing::info!(grace_secs = grace.as_secs(), "draining in-flight requests");
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            result = server => {
                result.map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;
                tracing::info!("API server stopped");
            }
            () = deadline => {
                tracing::warn!("shutdown grace period elapsed, dropping open connections");
            }
        }

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
