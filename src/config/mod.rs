//! Configuration management for the InfraFlow registry
//!
//! Values resolve as environment variable, then TOML file, then default.

pub mod file;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::devices::RegistryLimits;
use crate::devices::registry::{DEFAULT_MAX_PENDING_COMMANDS, DEFAULT_TELEMETRY_RETENTION};
use crate::Result;

use file::InfraflowConfigFile;

/// Default API port
pub const DEFAULT_PORT: u16 = 8080;

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "InfraFlow Federated Access";

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    /// Parse an environment name, treating unknown names as production
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            "test" => Self::Test,
            "production" | "prod" => Self::Production,
            other => {
                tracing::warn!(environment = other, "unknown environment, treating as production");
                Self::Production
            }
        }
    }

    /// Whether internal error details may be returned to callers
    #[must_use]
    pub const fn exposes_error_details(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        })
    }
}

/// Registry service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment
    pub environment: Environment,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Registry configuration
    pub registry: RegistryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// How long shutdown waits for in-flight requests
    pub shutdown_grace: Duration,
}

/// Registry configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Start with the demo site devices and account
    pub seed_demo_data: bool,

    /// Telemetry samples kept per device
    pub telemetry_retention: usize,

    /// Queued commands allowed per device
    pub max_pending_commands: usize,
}

impl RegistryConfig {
    #[must_use]
    pub const fn limits(&self) -> RegistryLimits {
        RegistryLimits {
            telemetry_retention: self.telemetry_retention,
            max_pending_commands: self.max_pending_commands,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(InfraflowConfigFile::default(), &|_| None)
    }
}

impl Config {
    /// Load configuration from the environment and the TOML file
    ///
    /// An explicit `config_path` must exist and parse; the default path is
    /// optional and falls back to defaults on error.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file cannot be loaded
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = match config_path {
            Some(path) => file::load_config_file_from(path)?,
            None => file::load_config_file(),
        };
        Ok(Self::resolve(fc, &|key| std::env::var(key).ok()))
    }

    /// Resolve configuration from a file overlay and a variable lookup
    pub fn resolve(fc: InfraflowConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| env(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let environment = env("INFRAFLOW_ENV")
            .or_else(|| env("NODE_ENV"))
            .or(fc.environment)
            .map_or_else(Environment::default, |s| Environment::parse(&s));

        let server = ServerConfig {
            host: env("INFRAFLOW_HOST")
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(env, "PORT")
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            shutdown_grace: Duration::from_secs(
                parsed(env, "INFRAFLOW_SHUTDOWN_GRACE_SECS")
                    .or(fc.server.shutdown_grace_secs)
                    .unwrap_or(10),
            ),
        };

        let registry = RegistryConfig {
            seed_demo_data: flag("INFRAFLOW_SEED_DEMO")
                .or(fc.registry.seed_demo_data)
                .unwrap_or(false),
            telemetry_retention: parsed(env, "INFRAFLOW_TELEMETRY_RETENTION")
                .or(fc.registry.telemetry_retention)
                .unwrap_or(DEFAULT_TELEMETRY_RETENTION)
                .max(1),
            max_pending_commands: parsed(env, "INFRAFLOW_MAX_PENDING_COMMANDS")
                .or(fc.registry.max_pending_commands)
                .unwrap_or(DEFAULT_MAX_PENDING_COMMANDS)
                .max(1),
        };

        Self {
            environment,
            server,
            registry,
        }
    }

    /// Socket address string for the listener
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Look up `key` and parse it, ignoring unparseable values
fn parsed<T: FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}
