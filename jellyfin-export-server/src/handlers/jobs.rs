use axum::{
    Json,
    extract::{Path, Query, State},
};
use jellyfin_export_core::{
    api::types::{ApiResponse, JobsOverview, JobsQuery},
    jobs::JobRecord,
    types::JobId,
};
use uuid::Uuid;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

const MAX_RECENT: usize = 500;

pub async fn jobs_overview_handler(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> AppResult<Json<ApiResponse<JobsOverview>>> {
    let limit = query.limit.unwrap_or(50).min(MAX_RECENT);
    let snapshot = state.queue().snapshot().await?;
    let recent = state.queue().recent(limit).await?;
    Ok(Json(ApiResponse::success(JobsOverview { snapshot, recent })))
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<JobRecord>>> {
    let job = state
        .queue()
        .get(JobId(id))
        .await?
        .ok_or_else(|| AppError::not_found(format!("Job not found: {id}")))?;
    Ok(Json(ApiResponse::success(job)))
}
