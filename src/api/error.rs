//! JSON error envelopes and body extraction

use std::any::Any;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, OriginalUri, Path, Query, Request, State},
    http::{Method, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::ApiState;
use crate::devices::{DeviceStatus, DeviceType};
use crate::{Error, ErrorKind};

/// Message returned for internal failures outside development
pub const REDACTED_MESSAGE: &str = "An error occurred";

/// Current time in the envelope format (RFC 3339, milliseconds, `Z`)
#[must_use]
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Detail of an internal failure, attached to the redacted response
///
/// Only [`reveal_internal_errors`] reads it, and only in development.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

/// Error returned by API handlers
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => {
                tracing::error!(error = %err, "request failed");
                return internal_error_response(err.to_string());
            }
        };

        let mut body = match &err {
            Error::MissingFields(required) => {
                json!({ "error": "Missing required fields", "required": required })
            }
            Error::InvalidDeviceType(_) => json!({
                "error": "Invalid device type",
                "valid_types": DeviceType::ALL.map(DeviceType::as_str),
            }),
            Error::InvalidStatus(_) => json!({
                "error": "Invalid or missing status. Must be one of: online, offline, degraded",
                "valid_statuses": DeviceStatus::ALL.map(DeviceStatus::as_str),
            }),
            Error::InvalidHealth(value) => {
                json!({ "error": "Health must be an integer between 0 and 100", "health": value })
            }
            Error::InvalidCommandStatus(_) => json!({
                "error": "Invalid command status. Must be one of: completed, failed",
                "valid_statuses": ["completed", "failed"],
            }),
            Error::CommandQueueFull { device_id, limit } => json!({
                "error": "Command queue full",
                "device_id": device_id,
                "limit": limit,
            }),
            Error::InvalidBody(detail) => {
                json!({ "error": "Invalid request body", "message": detail })
            }
            Error::InvalidParameters(detail) => {
                json!({ "error": "Invalid request parameters", "message": detail })
            }
            Error::DeviceNotFound(id) => json!({ "error": "Device not found", "device_id": id }),
            Error::AccountNotFound(id) => {
                json!({ "error": "Account not found", "account_id": id })
            }
            Error::CommandNotFound {
                device_id,
                command_id,
            } => json!({
                "error": "Command not found",
                "device_id": device_id,
                "command_id": command_id,
            }),
            other => json!({ "error": other.to_string() }),
        };

        if let Value::Object(map) = &mut body {
            map.insert("timestamp".to_string(), Value::String(timestamp()));
        }
        (status, Json(body)).into_response()
    }
}

/// Redacted 500 envelope carrying the real detail as an extension
fn internal_error_response(detail: String) -> Response {
    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(internal_envelope(REDACTED_MESSAGE)),
    )
        .into_response();
    response.extensions_mut().insert(InternalDetail(detail));
    response
}

fn internal_envelope(message: &str) -> Value {
    json!({
        "error": "Internal Server Error",
        "message": message,
        "timestamp": timestamp(),
    })
}

/// Response for a handler panic caught by `CatchPanicLayer`
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(ToString::to_string))
        .unwrap_or_else(|| "handler panicked".to_string());

    tracing::error!(panic = %detail, "request handler panicked");
    internal_error_response(detail)
}

/// Swap the redacted message for the real detail in development
pub async fn reveal_internal_errors(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Response {
    let response = next.run(req).await;
    if !state.environment.exposes_error_details() {
        return response;
    }

    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };
    (response.status(), Json(internal_envelope(&detail))).into_response()
}

/// Fallback for unmatched routes and methods
pub async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": format!("Route {method} {} does not exist", uri.path()),
            "timestamp": timestamp(),
        })),
    )
        .into_response()
}

/// JSON body extractor reporting failures in the error envelope
///
/// An empty body decodes as `{}`, and the content type is not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| Error::InvalidBody(rejection.body_text()))?;

        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };

        serde_json::from_slice(raw)
            .map(Self)
            .map_err(|e| Error::InvalidBody(e.to_string()).into())
    }
}

/// Query string extractor reporting failures in the error envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection| Error::InvalidParameters(rejection.body_text()).into())
    }
}

/// Path parameter extractor reporting failures in the error envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct PathParams<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParams<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            // A route/extractor mismatch is a server fault, not bad input
            Err(rejection) if rejection.status().is_server_error() => {
                Err(Error::Internal(rejection.body_text()).into())
            }
            Err(rejection) => Err(Error::InvalidParameters(rejection.body_text()).into()),
        }
    }
}
