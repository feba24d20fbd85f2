use super::{require_admin, ApiError, ApiState};
use crate::export::ExportMapping;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;

/// Partial update body; only fields present are changed.
#[derive(Debug, Deserialize)]
pub struct ExportUpdate {
    pub realtime: Option<bool>,
    pub batch_interval: Option<u64>,
}

/// GET /api/exports
pub(super) async fn list_exports(State(state): State<Arc<ApiState>>) -> Json<Vec<ExportMapping>> {
    Json(state.coordinator.lock().await.mappings())
}

/// GET /api/exports/:entity_id
pub(super) async fn get_export(
    State(state): State<Arc<ApiState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<ExportMapping>, ApiError> {
    let coordinator = state.coordinator.lock().await;
    coordinator
        .entity_config(&entity_id)
        .map(|config| Json(ExportMapping::from(&config)))
        .ok_or_else(|| not_exported(&entity_id))
}

/// PUT /api/exports/:entity_id
pub(super) async fn update_export(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(entity_id): Path<String>,
    Json(update): Json<ExportUpdate>,
) -> Result<Json<ExportMapping>, ApiError> {
    require_admin(&headers, &state.admin_token)?;

    if update.batch_interval == Some(0) {
        return Err(ApiError::BadRequest(
            "batch_interval must be at least 1 second".to_string(),
        ));
    }

    let mut coordinator = state.coordinator.lock().await;
    if coordinator.entity_config(&entity_id).is_none() {
        return Err(not_exported(&entity_id));
    }

    if let Some(realtime) = update.realtime {
        coordinator.set_realtime(&entity_id, realtime);
    }
    if let Some(seconds) = update.batch_interval {
        coordinator.set_batch_interval(&entity_id, seconds);
    }

    coordinator
        .entity_config(&entity_id)
        .map(|config| Json(ExportMapping::from(&config)))
        .ok_or_else(|| not_exported(&entity_id))
}

fn not_exported(entity_id: &str) -> ApiError {
    ApiError::NotFound(format!("Entity '{}' is not exported", entity_id))
}
