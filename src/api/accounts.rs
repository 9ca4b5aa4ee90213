//! Account API endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::Serialize;
use tokio::sync::Mutex;

use super::ApiState;
use super::error::{ApiError, JsonBody, PathParams, timestamp};
use crate::accounts::{Account, AccountRegistry, NewAccount};

/// Shared account registry
pub type SharedAccountRegistry = Arc<Mutex<AccountRegistry>>;

#[derive(Serialize)]
struct AccountListResponse {
    accounts: Vec<Account>,
    count: usize,
    timestamp: String,
}

#[derive(Serialize)]
struct AccountResponse {
    account: Account,
    timestamp: String,
}

/// List all accounts
async fn list_accounts(State(state): State<Arc<ApiState>>) -> Json<AccountListResponse> {
    let accounts: Vec<Account> = state
        .accounts
        .lock()
        .await
        .list()
        .into_iter()
        .cloned()
        .collect();

    Json(AccountListResponse {
        count: accounts.len(),
        accounts,
        timestamp: timestamp(),
    })
}

/// Create an account
async fn create_account(
    State(state): State<Arc<ApiState>>,
    JsonBody(request): JsonBody<NewAccount>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let (account, count) = {
        let mut registry = state.accounts.lock().await;
        let account = registry.create(request)?;
        (account, registry.len())
    };
    state.metrics.set_accounts(count);

    tracing::info!(account_id = %account.id, "account created");

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            account,
            timestamp: timestamp(),
        }),
    ))
}

/// Get a single account
async fn get_account(
    State(state): State<Arc<ApiState>>,
    PathParams(account_id): PathParams<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.accounts.lock().await.get(&account_id)?.clone();

    Ok(Json(AccountResponse {
        account,
        timestamp: timestamp(),
    }))
}

/// Build the accounts router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route("/{account_id}", get(get_account))
        .with_state(state)
}
