//! TOML configuration file loading
//!
//! Supports `~/.config/infraflow/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct InfraflowConfigFile {
    /// Deployment environment ("development", "production", "test")
    #[serde(default)]
    pub environment: Option<String>,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Registry configuration
    #[serde(default)]
    pub registry: RegistryFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address
    pub host: Option<String>,

    /// API server port
    pub port: Option<u16>,

    /// Seconds to drain in-flight requests on shutdown
    pub shutdown_grace_secs: Option<u64>,
}

/// Registry configuration
#[derive(Debug, Default, Deserialize)]
pub struct RegistryFileConfig {
    /// Start with the demo site devices and account
    pub seed_demo_data: Option<bool>,

    /// Telemetry samples kept per device
    pub telemetry_retention: Option<usize>,

    /// Queued commands allowed per device
    pub max_pending_commands: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `InfraflowConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> InfraflowConfigFile {
    let Some(path) = config_file_path() else {
        return InfraflowConfigFile::default();
    };

    if !path.exists() {
        return InfraflowConfigFile::default();
    }

    match load_config_file_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            InfraflowConfigFile::default()
        }
    }
}

/// Load a TOML config file from an explicit path
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file_from(path: &Path) -> Result<InfraflowConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/infraflow/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("infraflow").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let config: InfraflowConfigFile = toml::from_str(
            r#"
            environment = "production"

            [server]
            port = 9090

            [registry]
            seed_demo_data = true
            "#,
        )
        .unwrap();

        assert_eq!(config.environment.as_deref(), Some("production"));
        assert_eq!(config.server.port, Some(9090));
        assert_eq!(config.server.host, None);
        assert_eq!(config.registry.seed_demo_data, Some(true));
        assert_eq!(config.registry.telemetry_retention, None);
    }

    #[test]
    fn explicit_path_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        assert!(load_config_file_from(&path).is_err());

        std::fs::write(&path, "server = 3").unwrap();
        assert!(matches!(load_config_file_from(&path), Err(Error::Toml(_))));
    }
}
