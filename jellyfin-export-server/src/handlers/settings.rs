use axum::{Json, extract::State};
use jellyfin_export_core::{
    actions::SettingsForm, api::types::ApiResponse, settings::ExportSettings,
};
use tracing::info;

use crate::infra::{app_state::AppState, errors::AppResult};

pub async fn get_settings_handler(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<ExportSettings>>> {
    let settings = state.settings().load().await?;
    Ok(Json(ApiResponse::success(settings)))
}

/// Replace the whole settings document.
pub async fn put_settings_handler(
    State(state): State<AppState>,
    Json(settings): Json<ExportSettings>,
) -> AppResult<Json<ApiResponse<ExportSettings>>> {
    settings.validate()?;
    state.settings().save(&settings).await?;
    info!(
        enabled = settings.enabled,
        libraries = settings.libraries.len(),
        "export settings updated"
    );
    Ok(Json(
        ApiResponse::success(settings).with_message("Settings saved".to_string()),
    ))
}

/// Action buttons the settings screen renders.
pub async fn get_settings_form_handler() -> Json<ApiResponse<SettingsForm>> {
    Json(ApiResponse::success(SettingsForm::new()))
}
