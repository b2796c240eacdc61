use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::error::RelayError;
use crate::server::server::AppState;
use crate::store::SessionStore;
use crate::upstream::{Credentials, HttpUpstream};

pub const GRADES_PATH: &str = "/grades";
pub const AUTH_PATH: &str = "/auth";
pub const SESSION_PATH: &str = "/session";
pub const RESERVED_PATHS: [&str; 3] = [GRADES_PATH, AUTH_PATH, SESSION_PATH];

pub const OVERRIDE_USERNAME_HEADER: &str = "x-upstream-username";
pub const OVERRIDE_PASSWORD_HEADER: &str = "x-upstream-password";

pub type RelayCoordinator = Coordinator<SessionStore, HttpUpstream>;

#[derive(Clone)]
pub struct RelayState {
    pub coordinator: Arc<RelayCoordinator>,
}

impl RelayState {
    pub fn new(coordinator: Arc<RelayCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn router(&self) -> Router<AppState> {
        Router::new()
            .route(GRADES_PATH, get(get_grades))
            .route(AUTH_PATH, post(post_auth))
            .route(SESSION_PATH, get(get_session))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GradesQuery {
    #[serde(default)]
    pub force: Option<String>,
}

impl GradesQuery {
    pub fn force_refresh(&self) -> bool {
        self.force.as_deref() == Some("true")
    }
}

async fn get_grades(
    State(state): State<AppState>,
    Query(query): Query<GradesQuery>,
    headers: HeaderMap,
) -> Response {
    let credentials = match override_credentials(&headers) {
        Ok(credentials) => credentials,
        Err(response) => return response,
    };

    match state
        .relay_state
        .coordinator
        .get_data(query.force_refresh(), credentials)
        .await
    {
        Ok(grades) => Json(json!({ "grades": grades })).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn post_auth(State(state): State<AppState>) -> Response {
    match state.relay_state.coordinator.reauthenticate().await {
        Ok(()) => Json(json!({
            "success": true,
            "message": "Re-authentication successful. Token has been updated.",
        }))
        .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn get_session(State(state): State<AppState>) -> Response {
    match state.relay_state.coordinator.status().await {
        Ok(status) => Json(status).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Both override headers or neither.
fn override_credentials(headers: &HeaderMap) -> Result<Option<Credentials>, Response> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    match (header(OVERRIDE_USERNAME_HEADER), header(OVERRIDE_PASSWORD_HEADER)) {
        (Some(username), Some(password)) => Ok(Some(Credentials::new(username, password))),
        (None, None) => Ok(None),
        _ => {
            warn!("incomplete override credentials in request");
            Err((
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "bad_request",
                    "message": format!(
                        "override credentials need both '{}' and '{}' headers",
                        OVERRIDE_USERNAME_HEADER, OVERRIDE_PASSWORD_HEADER
                    ),
                })),
            )
                .into_response())
        }
    }
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            RelayError::UpstreamAuthExpired => StatusCode::BAD_GATEWAY,
            RelayError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            RelayError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        info!(status = status.as_u16(), error = self.code(), "request failed: {}", self);
        (
            status,
            Json(json!({ "error": self.code(), "message": self.to_string() })),
        )
            .into_response()
    }
}
