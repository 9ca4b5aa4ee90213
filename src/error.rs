//! Error types for the InfraFlow registry

use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used at the HTTP boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid input
    Validation,
    /// Unknown identifier
    NotFound,
    /// Unexpected fault
    Internal,
}

/// Errors that can occur in the registry, API and worker
#[derive(Debug, Error)]
pub enum Error {
    /// Required request fields absent or empty
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Device type outside the fixed set
    #[error("invalid device type: {0}")]
    InvalidDeviceType(String),

    /// Device status outside the fixed set
    #[error("invalid device status: {0}")]
    InvalidStatus(String),

    /// Health outside 0-100
    #[error("health out of range: {0}")]
    InvalidHealth(i64),

    /// Command acknowledgement status outside the fixed set
    #[error("invalid command status: {0}")]
    InvalidCommandStatus(String),

    /// Device command queue is full
    #[error("command queue full for device {device_id} (limit {limit})")]
    CommandQueueFull { device_id: String, limit: usize },

    /// Request body could not be decoded
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Path segment or query string could not be decoded
    #[error("invalid request parameters: {0}")]
    InvalidParameters(String),

    /// Device not found
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Account not found
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Command not pending for the device
    #[error("command {command_id} not found for device {device_id}")]
    CommandNotFound {
        device_id: String,
        command_id: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Registry returned a non-success status to the worker
    #[error("registry responded {status}: {body}")]
    Upstream {
        status: u16,
        body: String,
        /// Seconds from a `Retry-After` header, if any
        retry_after: Option<u64>,
    },

    /// Metrics registry error
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify the error for status-code mapping
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFields(_)
            | Self::InvalidDeviceType(_)
            | Self::InvalidStatus(_)
            | Self::InvalidHealth(_)
            | Self::InvalidCommandStatus(_)
            | Self::CommandQueueFull { .. }
            | Self::InvalidBody(_)
            | Self::InvalidParameters(_) => ErrorKind::Validation,
            Self::DeviceNotFound(_) | Self::AccountNotFound(_) | Self::CommandNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::Config(_)
            | Self::Upstream { .. }
            | Self::Metrics(_)
            | Self::Io(_)
            | Self::Http(_)
            | Self::Serialization(_)
            | Self::Toml(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a worker call that failed with this error is worth retrying
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Upstream { status, body, .. } => {
                crate::worker::retry::is_recoverable(*status, body)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_classify_as_validation() {
        assert_eq!(
            Error::MissingFields(vec!["type"]).kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::InvalidHealth(101).kind(), ErrorKind::Validation);
        assert_eq!(
            Error::InvalidBody("eof".to_string()).kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn lookups_classify_as_not_found() {
        assert_eq!(
            Error::DeviceNotFound("dev_x".to_string()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::CommandNotFound {
                device_id: "dev_x".to_string(),
                command_id: "cmd_y".to_string(),
            }
            .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn missing_fields_message_lists_fields() {
        let err = Error::MissingFields(vec!["email", "name"]);
        assert_eq!(err.to_string(), "missing required fields: email, name");
    }

    #[test]
    fn upstream_5xx_is_transient_but_4xx_is_not() {
        let server = Error::Upstream {
            status: 503,
            body: String::new(),
            retry_after: None,
        };
        let client = Error::Upstream {
            status: 404,
            body: String::new(),
            retry_after: None,
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!Error::DeviceNotFound("x".to_string()).is_transient());
    }
}
