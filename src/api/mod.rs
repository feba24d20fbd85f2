//! HTTP control surface.
//!
//! - `GET /api/exports` lists export mappings
//! - `PUT /api/exports/:entity_id` switches mode or batch interval
//! - `GET /api/states` lists every state in the in-memory store
//! - `GET /api/states/:entity_id` reads one state
//! - `POST /api/states` writes a state (raises a change event)
//! - `DELETE /api/states/:entity_id` removes a state
//!
//! Mutating routes require the admin bearer token when one is configured.

mod exports;
mod states;

use crate::export::ExportCoordinator;
use crate::state::StateEngine;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Mutex<ExportCoordinator>>,
    pub state_engine: Arc<StateEngine>,
    /// Bearer token for mutating routes. None = unrestricted.
    pub admin_token: Option<String>,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/exports", get(exports::list_exports))
        .route(
            "/api/exports/:entity_id",
            get(exports::get_export).put(exports::update_export),
        )
        .route(
            "/api/states",
            get(states::list_states).post(states::put_state),
        )
        .route(
            "/api/states/:entity_id",
            get(states::get_state).delete(states::delete_state),
        )
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    NotFound(String),
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Err(Unauthorized) unless the bearer token matches `expected`.
/// Always Ok when no token is configured.
fn require_admin(headers: &HeaderMap, expected: &Option<String>) -> Result<(), ApiError> {
    let Some(expected_token) = expected else {
        return Ok(());
    };

    let token = headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token == expected_token => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn test_no_admin_token_allows_everything() {
        assert!(require_admin(&HeaderMap::new(), &None).is_ok());
    }

    #[test]
    fn test_admin_token_checks() {
        let expected = Some("secret".to_string());
        assert!(require_admin(&headers_with("Bearer secret"), &expected).is_ok());
        assert!(require_admin(&headers_with("Bearer wrong"), &expected).is_err());
        assert!(require_admin(&headers_with("secret"), &expected).is_err());
        assert!(require_admin(&HeaderMap::new(), &expected).is_err());
    }
}
