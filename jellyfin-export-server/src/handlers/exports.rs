use axum::{
    Json,
    extract::{Query, State},
};
use jellyfin_export_core::{
    api::types::{ApiResponse, ExportsQuery},
    export_map::ExportRecord,
};

use crate::infra::{app_state::AppState, errors::AppResult};

const MAX_EXPORTS: usize = 1000;

pub async fn list_exports_handler(
    State(state): State<AppState>,
    Query(mut query): Query<ExportsQuery>,
) -> AppResult<Json<ApiResponse<Vec<ExportRecord>>>> {
    query.limit = Some(query.limit.unwrap_or(100).min(MAX_EXPORTS));
    let records = state.exports().list(&query).await?;
    Ok(Json(ApiResponse::success(records)))
}
