pub mod instances;
pub mod projects;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::lifecycle::{InstanceError, InstanceManager};
use crate::projects::ProjectRegistry;
use crate::ui::logs::LogLine;

#[derive(Clone)]
pub struct LauncherState {
    pub manager: InstanceManager,
    pub projects: Arc<dyn ProjectRegistry>,
}

pub fn api_router(state: LauncherState) -> Router {
    Router::new()
        .route("/api/projects", get(projects::list_projects))
        .route("/api/instances", get(instances::list_instances))
        .route(
            "/api/instances/{id}",
            get(instances::get_instance)
                .post(instances::spawn_instance)
                .delete(instances::stop_instance),
        )
        .route("/api/instances/{id}/output", get(instances::get_output))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub output: Vec<LogLine>,
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            output: Vec::new(),
        }),
    )
        .into_response()
}

fn status_for(err: &InstanceError) -> StatusCode {
    match err {
        InstanceError::AlreadyRunning { .. } => StatusCode::CONFLICT,
        InstanceError::NotRunning { .. } => StatusCode::NOT_FOUND,
        InstanceError::PortsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for InstanceError {
    fn into_response(self) -> Response {
        (
            status_for(&self),
            Json(ErrorResponse {
                error: self.summary(),
                output: self.output().to_vec(),
            }),
        )
            .into_response()
    }
}
