use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::projects::Project;

/// Compute a project ID by hashing the given path string with SHA-256
/// and returning the first 8 hex characters.
///
/// The path is hashed as given; callers canonicalize first when they want a
/// stable id.
pub fn compute_project_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..4])
}

/// Describe a directory that is not listed in the config as a project.
///
/// The directory is canonicalized so the id does not depend on how the path
/// was spelled on the command line.
pub fn adhoc_project(dir: &Path) -> anyhow::Result<Project> {
    let canonical: PathBuf = dir.canonicalize()?;
    let name = canonical
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    Ok(Project {
        id: compute_project_id(&canonical),
        name,
        path: canonical,
    })
}
