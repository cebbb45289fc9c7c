use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::model::ProjdeckConfig;
use crate::platform;

/// Minimum Jaro-Winkler score to offer a project id as a suggestion.
const PROJECT_SUGGESTION_THRESHOLD: f64 = 0.8;

/// A project that can be opened in its own dashboard instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

/// Resolves project ids to their on-disk location.
pub trait ProjectRegistry: Send + Sync {
    fn get(&self, id: &str) -> Option<Project>;

    /// All known projects, ordered by id.
    fn list(&self) -> Vec<Project>;
}

/// Registry backed by the `[projects.*]` tables of the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigProjects {
    projects: BTreeMap<String, Project>,
}

impl ConfigProjects {
    /// Relative project paths are resolved against `config_dir`.
    pub fn from_config(config: &ProjdeckConfig, config_dir: &Path) -> Self {
        let projects = config
            .projects
            .iter()
            .map(|(id, project)| {
                let path = PathBuf::from(platform::expand_home(&project.path));
                let path = if path.is_absolute() {
                    path
                } else {
                    config_dir.join(path)
                };
                let project = Project {
                    id: id.clone(),
                    name: project.name.clone().unwrap_or_else(|| id.clone()),
                    path,
                };
                (id.clone(), project)
            })
            .collect();
        Self { projects }
    }

    /// Add an ad-hoc project not listed in the config.
    pub fn insert(&mut self, project: Project) {
        self.projects.insert(project.id.clone(), project);
    }
}

impl ProjectRegistry for ConfigProjects {
    fn get(&self, id: &str) -> Option<Project> {
        self.projects.get(id).cloned()
    }

    fn list(&self) -> Vec<Project> {
        self.projects.values().cloned().collect()
    }
}

/// Closest known project id to `id`, for "did you mean" hints.
pub fn suggest_project(registry: &dyn ProjectRegistry, id: &str) -> Option<String> {
    let mut best: Option<(String, f64)> = None;
    for project in registry.list() {
        let score = strsim::jaro_winkler(id, &project.id);
        if score >= PROJECT_SUGGESTION_THRESHOLD && best.as_ref().is_none_or(|(_, s)| score > *s) {
            best = Some((project.id, score));
        }
    }
    best.map(|(id, _)| id)
}

/// Error text for an unknown project id, with a suggestion when one is close.
pub fn unknown_project_message(registry: &dyn ProjectRegistry, id: &str) -> String {
    match suggest_project(registry, id) {
        Some(suggestion) => format!("unknown project '{}' (did you mean `{}`?)", id, suggestion),
        None => format!("unknown project '{}'", id),
    }
}
