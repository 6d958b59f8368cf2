use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use jellyfin_export_core::{
    actions::{RemoteCall, RemoteMethod},
    api::types::ApiResponse,
    sync::SyncAccepted,
};
use serde_json::{Map, Value};
use tracing::info;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Whitelisted remote procedure endpoint used by the settings form.
///
/// The body is an optional JSON object of keyword arguments.
pub async fn call_method_handler(
    State(state): State<AppState>,
    Path(method): Path<String>,
    body: Bytes,
) -> AppResult<Json<ApiResponse<SyncAccepted>>> {
    let method = RemoteMethod::from_name(&method)
        .ok_or_else(|| AppError::not_found(format!("Unknown method: {method}")))?;
    let call = RemoteCall {
        method,
        args: parse_args(&body)?,
    };

    info!(method = %call.method, "remote method called");
    let accepted = match call.method {
        RemoteMethod::SyncAll => state.sync.sync_all().await?,
        RemoteMethod::SyncLibrary => {
            state.sync.sync_library(required_library(&call)?).await?
        }
        RemoteMethod::CleanupLibrary => {
            state.sync.cleanup_library(required_library(&call)?).await?
        }
    };

    let message = accepted.message.clone();
    Ok(Json(ApiResponse::success(accepted).with_message(message)))
}

fn parse_args(body: &[u8]) -> AppResult<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(AppError::bad_request("arguments must be a JSON object")),
        Err(err) => Err(AppError::bad_request(format!("invalid arguments: {err}"))),
    }
}

fn required_library(call: &RemoteCall) -> AppResult<&str> {
    call.library_name()
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("library_name is required"))
}
