use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::lifecycle::{InstanceInfo, InstanceState};

use super::LauncherState;

#[derive(Debug, Serialize)]
pub struct ProjectStatus {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceInfo>,
}

pub async fn list_projects(State(state): State<LauncherState>) -> Json<Vec<ProjectStatus>> {
    let projects = state
        .projects
        .list()
        .into_iter()
        .map(|project| ProjectStatus {
            state: state.manager.instance_state(&project.id),
            instance: state.manager.get_instance(&project.id),
            id: project.id,
            name: project.name,
            path: project.path,
        })
        .collect();
    Json(projects)
}
