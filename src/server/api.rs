use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use shipdeck_common::Project;
use tokio_util::sync::CancellationToken;

use crate::access::readable_projects;
use crate::errors::StatusError;
use crate::notify::NotificationHub;
use crate::status::ReconciliationEngine;

/// Header carrying the authenticated user, set by the fronting auth proxy.
pub const USER_HEADER: &str = "X-Forwarded-User";

/// Shared application state.
pub struct AppState {
    pub engine: ReconciliationEngine,
    pub projects: Vec<Project>,
    pub hub: NotificationHub,
}

pub type SharedState = Arc<AppState>;

// ── Error type ────────────────────────────────────────────────────────

pub struct ApiError(StatusError);

impl From<StatusError> for ApiError {
    fn from(e: StatusError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StatusError::NotFound(_) => StatusCode::NOT_FOUND,
            StatusError::Forbidden { .. } => StatusCode::FORBIDDEN,
            StatusError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({"error": self.0.to_string()}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/commits/{project}", get(get_commits))
        .route("/api/projects", get(list_projects))
        .route("/health", get(health))
}

fn request_user(headers: &HeaderMap) -> Result<String, StatusError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StatusError::Internal(format!("missing {} header", USER_HEADER)))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn get_commits(
    State(state): State<SharedState>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = request_user(&headers)?;
    // Dropping the request (client gone) aborts the in-flight lookups.
    let cancel = CancellationToken::new();
    let _abort = cancel.clone().drop_guard();

    let status = state
        .engine
        .fetch_statuses(&cancel, &state.projects, &project, &user)
        .await
        .inspect_err(|e| tracing::warn!(project = %project, user = %user, error = %e, "status request failed"))?;
    Ok(Json(status))
}

#[derive(Serialize)]
struct ProjectList {
    projects: Vec<String>,
}

async fn list_projects(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = request_user(&headers)?;
    let projects = readable_projects(state.engine.gate(), &state.projects, &user)
        .await
        .into_iter()
        .map(|p| p.name.clone())
        .collect();
    Ok(Json(ProjectList { projects }))
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "subscribers": state.hub.subscriber_count().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (StatusError::NotFound("web".into()), StatusCode::NOT_FOUND),
            (
                StatusError::Forbidden {
                    project: "web".into(),
                    user: "bob".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (StatusError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn test_request_user_header() {
        let mut headers = HeaderMap::new();
        assert!(request_user(&headers).is_err());
        headers.insert(USER_HEADER, "  ".parse().unwrap());
        assert!(request_user(&headers).is_err());
        headers.insert(USER_HEADER, "alice".parse().unwrap());
        assert_eq!(request_user(&headers).unwrap(), "alice");
    }
}
