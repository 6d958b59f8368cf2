use axum::{Json, extract::State, http::StatusCode};
use jellyfin_export_core::api::types::{
    ApiResponse, EntityEvent, EntityHookRequest, EntityHookResponse,
};
use tracing::debug;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

/// Drive document events: created, renamed, moved, purged or trashed.
pub async fn drive_entity_hook_handler(
    State(state): State<AppState>,
    Json(request): Json<EntityHookRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EntityHookResponse>>)> {
    if let Some(snapshot) = request.snapshot.as_ref() {
        if snapshot.id != request.entity {
            return Err(AppError::bad_request(format!(
                "snapshot id {} does not match entity {}",
                snapshot.id, request.entity
            )));
        }
        state.entities().save(snapshot).await?;
    }

    let handle = match request.event {
        EntityEvent::Changed => state.sync.on_entity_change(&request.entity).await?,
        EntityEvent::Trashed => state.sync.on_entity_trash(&request.entity).await?,
    };

    debug!(
        entity = %request.entity,
        event = ?request.event,
        queued = handle.is_some(),
        "drive entity hook handled"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(EntityHookResponse {
            job_id: handle.map(|handle| handle.job_id),
        })),
    ))
}
