use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::info;

use crate::infra::app_state::AppState;

pub async fn ping_handler() -> Result<Json<Value>, StatusCode> {
    info!("Ping endpoint called");
    Ok(Json(json!({
        "status": "ok",
        "message": "Jellyfin Export is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut health_status = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {}
    });
    let mut is_unhealthy = false;

    match state.postgres() {
        Some(pool) => match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => {
                health_status["checks"]["database"] = json!({
                    "status": "healthy",
                    "pool_size": pool.size(),
                    "idle_connections": pool.num_idle()
                });
            }
            Err(e) => {
                health_status["checks"]["database"] = json!({
                    "status": "unhealthy",
                    "error": e.to_string()
                });
                is_unhealthy = true;
            }
        },
        None => {
            health_status["checks"]["database"] = json!({
                "status": "healthy",
                "type": "memory"
            });
        }
    }

    match state.queue().snapshot().await {
        Ok(snapshot) => {
            health_status["checks"]["queue"] = json!({
                "status": "healthy",
                "queues": snapshot.queues
            });
        }
        Err(e) => {
            health_status["checks"]["queue"] = json!({
                "status": "unhealthy",
                "error": e.to_string()
            });
            is_unhealthy = true;
        }
    }

    health_status["checks"]["workers"] = json!({
        "configured": state.config().workers,
        "queues": state.config().queues,
        "shutting_down": state.shutdown.is_cancelled()
    });

    if is_unhealthy {
        health_status["status"] = json!("unhealthy");
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(health_status)))
    } else {
        Ok(Json(health_status))
    }
}
