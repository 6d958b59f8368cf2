use axum::{
    Router,
    routing::{get, post},
};
use jellyfin_export_core::api::routes::{relative, v1};

use crate::{
    AppState,
    handlers::{exports, hooks, jobs, method, settings},
};

/// Create all v1 API routes
pub fn create_v1_router(_state: AppState) -> Router<AppState> {
    Router::new()
        // Remote methods called by the settings form
        .route(
            relative(v1::method::CALL),
            post(method::call_method_handler),
        )
        // Settings document and form
        .route(
            relative(v1::settings::DOCUMENT),
            get(settings::get_settings_handler).put(settings::put_settings_handler),
        )
        .route(
            relative(v1::settings::FORM),
            get(settings::get_settings_form_handler),
        )
        // Drive host callbacks
        .route(
            relative(v1::hooks::DRIVE_ENTITY),
            post(hooks::drive_entity_hook_handler),
        )
        // Read models
        .route(relative(v1::exports::LIST), get(exports::list_exports_handler))
        .route(relative(v1::jobs::OVERVIEW), get(jobs::jobs_overview_handler))
        .route(relative(v1::jobs::ITEM), get(jobs::get_job_handler))
}
