//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use infraflow::accounts::AccountRegistry;
use infraflow::devices::{DeviceRegistry, RegistryLimits};
use infraflow::{ApiState, Environment, build_router};
use serde_json::Value;
use tower::ServiceExt;

/// Build state with the demo site seeded
pub fn demo_state(environment: Environment) -> Arc<ApiState> {
    Arc::new(
        ApiState::from_registries(
            DeviceRegistry::with_demo_devices(RegistryLimits::default()),
            AccountRegistry::with_demo_account(),
            environment,
        )
        .expect("failed to build state"),
    )
}

/// Build state with empty registries and explicit limits
pub fn empty_state(limits: RegistryLimits) -> Arc<ApiState> {
    Arc::new(
        ApiState::from_registries(
            DeviceRegistry::with_limits(limits),
            AccountRegistry::new(),
            Environment::Test,
        )
        .expect("failed to build state"),
    )
}

/// Router over the demo site
pub fn demo_router() -> Router {
    build_router(demo_state(Environment::Test))
}

/// Send a request and decode the JSON response body
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(
        app,
        method,
        uri,
        body.map(|b| b.to_string()).unwrap_or_default(),
    )
    .await;

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is not JSON")
    };
    (status, json)
}

/// Send a request with a raw body and return the raw response body
pub async fn send_raw(app: &Router, method: Method, uri: &str, body: String) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn put(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::PUT, uri, Some(body)).await
}

pub async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::DELETE, uri, None).await
}
