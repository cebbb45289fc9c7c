use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::lifecycle::InstanceInfo;
use crate::projects::unknown_project_message;

use super::{error_response, LauncherState};

pub async fn list_instances(State(state): State<LauncherState>) -> Json<Vec<InstanceInfo>> {
    Json(state.manager.list_instances())
}

pub async fn get_instance(
    State(state): State<LauncherState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.get_instance(&id) {
        Some(info) => Json(info).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("project '{}' has no running instance", id),
        ),
    }
}

pub async fn spawn_instance(
    State(state): State<LauncherState>,
    Path(id): Path<String>,
) -> Response {
    let Some(project) = state.projects.get(&id) else {
        return error_response(
            StatusCode::NOT_FOUND,
            unknown_project_message(state.projects.as_ref(), &id),
        );
    };

    match state.manager.spawn_instance(&project.id, &project.path).await {
        Ok(info) => (StatusCode::CREATED, Json(info)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn stop_instance(
    State(state): State<LauncherState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.stop_instance(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_output(State(state): State<LauncherState>, Path(id): Path<String>) -> Response {
    match state.manager.output(&id) {
        Some(lines) => Json(lines).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("project '{}' has no running instance", id),
        ),
    }
}
