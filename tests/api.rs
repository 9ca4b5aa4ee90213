//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    Router,
    http::{Method, StatusCode},
    routing::get as get_route,
};
use infraflow::api::error::{panic_response, reveal_internal_errors};
use infraflow::devices::RegistryLimits;
use infraflow::{Environment, build_router};
use serde_json::{Value, json};
use tower_http::catch_panic::CatchPanicLayer;

mod common;
use common::{delete, demo_router, demo_state, empty_state, get, post, put, send, send_raw};

fn device_count(body: &Value) -> u64 {
    body["count"].as_u64().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = demo_router();
    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "InfraFlow Federated Access");
    assert!(json["uptime"].as_f64().unwrap() >= 0.0);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_device_lifecycle_scenario() {
    let app = build_router(empty_state(RegistryLimits::default()));

    let (status, created) = post(&app, "/devices", json!({"type": "radio", "site_id": "s1"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["device"]["status"], "offline");
    assert_eq!(created["message"], "Device registered successfully");
    let id = created["device"]["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("dev_radio_"));

    let (status, beat) = put(
        &app,
        &format!("/devices/{id}/heartbeat"),
        json!({"status": "online", "health": 90}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beat["device"]["status"], "online");
    assert_eq!(beat["device"]["health"], 90);
    assert_eq!(beat["message"], "Heartbeat received");

    let (status, fetched) = get(&app, &format!("/devices/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["device"]["status"], "online");
    assert_eq!(fetched["device"]["health"], 90);

    let (status, removed) = delete(&app, &format!("/devices/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["device"]["id"], id.as_str());

    let (status, missing) = get(&app, &format!("/devices/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["error"], "Device not found");
    assert_eq!(missing["device_id"], id.as_str());
}

#[tokio::test]
async fn test_register_ignores_caller_status_and_health() {
    let app = demo_router();
    let (status, created) = post(
        &app,
        "/devices",
        json!({"type": "compute", "site_id": "s2", "status": "online", "health": 77}),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["device"]["status"], "offline");
    assert_eq!(created["device"]["health"], 0);
    assert_eq!(created["device"]["metadata"], json!({}));
}

#[tokio::test]
async fn test_heartbeat_merges_metadata_and_keeps_identity() {
    let app = demo_router();
    let (status, beat) = put(
        &app,
        "/devices/dev_radio_001/heartbeat",
        json!({"metadata": {"tx_power_dbm": 23, "channel": 4}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, fetched) = get(&app, "/devices/dev_radio_001").await;
    let device = &fetched["device"];
    assert_eq!(device, &beat["device"]);
    assert_eq!(device["id"], "dev_radio_001");
    assert_eq!(device["type"], "radio");
    assert_eq!(device["site_id"], "site_alpha");
    assert_eq!(device["status"], "online");
    assert_eq!(device["metadata"]["frequency_band"], "CBRS");
    assert_eq!(device["metadata"]["tx_power_dbm"], 23);
    assert_eq!(device["metadata"]["channel"], 4);
}

#[tokio::test]
async fn test_invalid_heartbeat_is_rejected_without_change() {
    let app = demo_router();
    let (_, before) = get(&app, "/devices/dev_gpu_001").await;

    let (status, json) = put(&app, "/devices/dev_gpu_001/heartbeat", json!({"health": 150})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["health"], 150);

    let (status, json) = put(
        &app,
        "/devices/dev_gpu_001/heartbeat",
        json!({"status": "exploding", "health": 50}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["valid_statuses"].is_array());

    let (_, after) = get(&app, "/devices/dev_gpu_001").await;
    assert_eq!(before["device"], after["device"]);
}

#[tokio::test]
async fn test_heartbeat_unknown_device() {
    let app = demo_router();
    let (status, json) = put(&app, "/devices/dev_none/heartbeat", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["device_id"], "dev_none");
}

#[tokio::test]
async fn test_delete_twice() {
    let app = demo_router();
    let (first, _) = delete(&app, "/devices/dev_gpu_001").await;
    let (second, _) = delete(&app, "/devices/dev_gpu_001").await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters() {
    let app = demo_router();
    post(&app, "/devices", json!({"type": "radio", "site_id": "site_beta"})).await;

    let (status, all) = get(&app, "/devices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(device_count(&all), 3);

    let (_, radios) = get(&app, "/devices?type=radio").await;
    assert_eq!(device_count(&radios), 2);
    assert!(
        radios["devices"]
            .as_array()
            .unwrap()
            .iter()
            .all(|d| d["type"] == "radio")
    );
    assert_eq!(radios["filters"]["type"], "radio");

    let (_, intersection) = get(&app, "/devices?type=compute&site_id=site_alpha").await;
    assert_eq!(device_count(&intersection), 1);
    assert_eq!(intersection["devices"][0]["id"], "dev_gpu_001");

    let (_, empty_values) = get(&app, "/devices?type=&status=").await;
    assert_eq!(device_count(&empty_values), 3);
}

#[tokio::test]
async fn test_list_rejects_unknown_filter_values() {
    let app = demo_router();
    let (status, json) = get(&app, "/devices?type=balloon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid device type");
}

#[tokio::test]
async fn test_undecodable_query_uses_error_envelope() {
    let app = demo_router();
    let (status, json) = get(&app, "/devices?type=radio&type=compute").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid request parameters");
    assert!(json["message"].as_str().unwrap().contains("type"));
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_undecodable_path_uses_error_envelope() {
    let app = demo_router();
    for uri in [
        "/devices/%FF",
        "/devices/%FF/telemetry",
        "/devices/dev_radio_001/commands/%FF/ack",
        "/accounts/%FF",
    ] {
        let method = if uri.ends_with("/ack") { Method::POST } else { Method::GET };
        let (status, json) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["error"], "Invalid request parameters", "{uri}");
        assert!(json["timestamp"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn test_site_id_is_kept_verbatim() {
    let app = build_router(empty_state(RegistryLimits::default()));
    let (status, json) = post(&app, "/devices", json!({"type": "radio", "site_id": " s1 "})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["device"]["site_id"], " s1 ");

    let (_, listed) = get(&app, "/devices?site_id=%20s1%20").await;
    assert_eq!(device_count(&listed), 1);
    let (_, listed) = get(&app, "/devices?site_id=s1").await;
    assert_eq!(device_count(&listed), 0);
}

#[tokio::test]
async fn test_invalid_type_leaves_registry_unchanged() {
    let app = demo_router();
    let (_, before) = get(&app, "/devices").await;

    let (status, json) = post(&app, "/devices", json!({"type": "balloon", "site_id": "s1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid device type");
    assert_eq!(
        json["valid_types"],
        json!(["radio", "compute", "backhaul", "power", "storage"])
    );

    let (_, after) = get(&app, "/devices").await;
    assert_eq!(device_count(&before), device_count(&after));
}

#[tokio::test]
async fn test_missing_fields() {
    let app = demo_router();
    let (status, json) = post(&app, "/devices", json!({"type": "radio"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing required fields");
    assert_eq!(json["required"], json!(["type", "site_id"]));
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = demo_router();
    let (status, bytes) = send_raw(&app, Method::POST, "/devices", "{not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"], "Invalid request body");

    let (status, _) = post(&app, "/devices", json!({"type": 7, "site_id": "s1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_projection_shares_device_store() {
    let app = demo_router();

    let (status, listing) = get(&app, "/devices/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 2);
    assert_eq!(listing["device_statuses"][0]["id"], "dev_radio_001");
    assert!(listing["device_statuses"][0].get("health").is_none());

    let (status, updated) = put(
        &app,
        "/devices/status/dev_radio_001/status",
        json!({"status": "degraded"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["device_status"]["status"], "degraded");
    assert_eq!(
        updated["message"],
        "Device dev_radio_001 status updated to degraded"
    );

    let (_, fetched) = get(&app, "/devices/dev_radio_001").await;
    assert_eq!(fetched["device"]["status"], "degraded");

    // Devices registered through /devices appear in the projection
    post(&app, "/devices", json!({"type": "power", "site_id": "s9"})).await;
    let (_, listing) = get(&app, "/devices/status").await;
    assert_eq!(listing["count"], 3);
}

#[tokio::test]
async fn test_set_status_validation_precedes_lookup() {
    let app = demo_router();

    let (status, json) = put(&app, "/devices/status/dev_none/status", json!({"status": "asleep"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["valid_statuses"], json!(["online", "offline", "degraded"]));

    let (status, _) = put(&app, "/devices/status/dev_none/status", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = put(&app, "/devices/status/dev_none/status", json!({"status": "online"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_telemetry_retention() {
    let app = build_router(empty_state(RegistryLimits {
        telemetry_retention: 2,
        ..RegistryLimits::default()
    }));
    let (_, created) = post(&app, "/devices", json!({"type": "radio", "site_id": "s1"})).await;
    let id = created["device"]["id"].as_str().unwrap().to_string();
    let uri = format!("/devices/{id}/telemetry");

    for rssi in [-70, -71, -72] {
        let (status, json) = post(&app, &uri, json!({"rssi": rssi})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["telemetry"]["data"]["rssi"], rssi);
    }

    let (status, json) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["telemetry"][0]["data"]["rssi"], -71);
    assert_eq!(json["telemetry"][1]["data"]["rssi"], -72);

    let (status, _) = post(&app, &uri, json!([1, 2, 3])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/devices/dev_none/telemetry", json!({"rssi": 1})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_command_queue_lifecycle() {
    let app = demo_router();
    let uri = "/devices/dev_radio_001/commands";

    let (status, first) = post(&app, uri, json!({"type": "reboot"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["command"]["status"], "pending");
    let first_id = first["command"]["id"].as_str().unwrap().to_string();
    assert!(first_id.starts_with("cmd_"));

    let (_, second) = post(&app, uri, json!({"type": "set_power", "params": {"dbm": 18}})).await;
    let second_id = second["command"]["id"].as_str().unwrap().to_string();

    let (status, pending) = get(&app, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["count"], 2);
    assert_eq!(pending["commands"][0]["id"], first_id.as_str());
    assert_eq!(pending["commands"][1]["id"], second_id.as_str());

    let ack_uri = format!("{uri}/{first_id}/ack");
    let (status, acked) = post(&app, &ack_uri, json!({"status": "completed"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["command"]["status"], "completed");
    assert!(acked["command"]["acknowledged_at"].is_string());

    let (status, _) = post(&app, &ack_uri, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, pending) = get(&app, uri).await;
    assert_eq!(pending["count"], 1);

    let (status, _) = post(&app, &format!("{uri}/{second_id}/ack"), json!({"status": "pending"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = post(&app, uri, json!({"params": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["required"], json!(["type"]));
}

#[tokio::test]
async fn test_accounts() {
    let app = demo_router();

    let (status, listing) = get(&app, "/accounts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["accounts"][0]["did"], "did:ifa:123abc456def");

    let (status, created) = post(
        &app,
        "/accounts",
        json!({"email": "ops@example.com", "name": "Ops"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let account = &created["account"];
    assert_eq!(account["status"], "active");
    assert!(account["did"].as_str().unwrap().starts_with("did:ifa:"));
    let id = account["id"].as_str().unwrap().to_string();

    let (status, fetched) = get(&app, &format!("/accounts/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["account"]["email"], "ops@example.com");

    let (status, missing) = get(&app, "/accounts/acc_unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["account_id"], "acc_unknown");

    let (status, json) = post(&app, "/accounts", json!({"email": "x@example.com"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["required"], json!(["email", "name"]));
}

#[tokio::test]
async fn test_unmatched_routes() {
    let app = demo_router();

    let (status, json) = get(&app, "/nowhere").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Not Found");
    assert_eq!(json["message"], "Route GET /nowhere does not exist");

    let (status, json) = send(&app, Method::PATCH, "/devices", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "Route PATCH /devices does not exist");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = demo_router();
    put(&app, "/devices/dev_radio_001/heartbeat", json!({"health": 97})).await;

    let (status, bytes) = send_raw(&app, Method::GET, "/metrics", String::new()).await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("infraflow_devices_registered 2"));
    assert!(text.contains("infraflow_device_heartbeats_total 1"));
    assert!(text.contains(r#"route="/devices/{device_id}/heartbeat""#));
}

fn panicking_router(environment: Environment) -> Router {
    async fn boom() -> &'static str {
        panic!("registry exploded")
    }

    Router::new()
        .route("/boom", get_route(boom))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::middleware::from_fn_with_state(
            demo_state(environment),
            reveal_internal_errors,
        ))
}

#[tokio::test]
async fn test_internal_errors_redacted_outside_development() {
    let app = panicking_router(Environment::Production);
    let (status, json) = get(&app, "/boom").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Internal Server Error");
    assert_eq!(json["message"], "An error occurred");
}

#[tokio::test]
async fn test_internal_errors_exposed_in_development() {
    let app = panicking_router(Environment::Development);
    let (status, json) = get(&app, "/boom").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["message"], "registry exploded");
}

#[tokio::test]
async fn test_state_is_isolated_between_routers() {
    let a = demo_router();
    let b = demo_router();
    delete(&a, "/devices/dev_radio_001").await;

    let (status, _) = get(&b, "/devices/dev_radio_001").await;
    assert_eq!(status, StatusCode::OK);

    let shared = demo_state(Environment::Test);
    let c = build_router(Arc::clone(&shared));
    delete(&c, "/devices/dev_gpu_001").await;
    assert_eq!(shared.devices.lock().await.len(), 1);
}
