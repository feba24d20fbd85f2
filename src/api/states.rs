use super::{require_admin, ApiError, ApiState};
use crate::state::{EntityState, StateStore};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Body of POST /api/states
#[derive(Debug, Deserialize)]
pub struct StateUpdate {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
    /// Defaults to the time of the request
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub entity_id: String,
}

/// GET /api/states, ordered by entity id
pub(super) async fn list_states(State(state): State<Arc<ApiState>>) -> Json<Vec<EntityState>> {
    let mut states = state.state_engine.get_all();
    states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    Json(states)
}

/// GET /api/states/:entity_id
pub(super) async fn get_state(
    State(state): State<Arc<ApiState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, ApiError> {
    state
        .state_engine
        .get_current(&entity_id)
        .map(Json)
        .ok_or_else(|| unknown_entity(&entity_id))
}

/// POST /api/states
pub(super) async fn put_state(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(update): Json<StateUpdate>,
) -> Result<Json<EntityState>, ApiError> {
    require_admin(&headers, &state.admin_token)?;

    if !update.entity_id.contains('.') {
        return Err(ApiError::BadRequest(format!(
            "Invalid entity id '{}': expected '<domain>.<object_id>'",
            update.entity_id
        )));
    }

    debug!(entity_id = %update.entity_id, state = %update.state, "State received");
    let change = state.state_engine.set_state_at(
        &update.entity_id,
        update.state,
        update.attributes,
        update.last_updated.unwrap_or_else(Utc::now),
    );

    change
        .new_state
        .map(Json)
        .ok_or_else(|| unknown_entity(&change.entity_id))
}

/// DELETE /api/states/:entity_id
pub(super) async fn delete_state(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(entity_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    require_admin(&headers, &state.admin_token)?;

    state
        .state_engine
        .remove_state(&entity_id)
        .map(|_| Json(DeleteResponse { entity_id: entity_id.clone() }))
        .ok_or_else(|| unknown_entity(&entity_id))
}

fn unknown_entity(entity_id: &str) -> ApiError {
    ApiError::NotFound(format!("Entity '{}' not found", entity_id))
}
