use std::collections::BTreeMap;
use std::path::{Component, Path};

use anyhow::{bail, Context, Result};
use tracing::debug;

/// Makes sure a project directory has the files a dashboard instance needs
/// before its first spawn.
pub trait TemplateInitializer: Send + Sync {
    /// Create whatever is missing under `project_path`. Returns the relative
    /// paths of files that were created; existing files are left alone.
    fn ensure(&self, project_id: &str, project_path: &Path) -> Result<Vec<String>>;
}

/// Writes the `[templates]` table: relative path -> contents, with `{name}`
/// (the project directory name) and `{id}` substituted.
#[derive(Debug, Clone, Default)]
pub struct FileTemplates {
    templates: BTreeMap<String, String>,
}

impl FileTemplates {
    pub fn new(templates: BTreeMap<String, String>) -> Self {
        Self { templates }
    }
}

fn render(contents: &str, project_id: &str, project_path: &Path) -> String {
    let name = project_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| project_id.to_string());
    contents.replace("{name}", &name).replace("{id}", project_id)
}

fn check_relative(rel: &str) -> Result<()> {
    let path = Path::new(rel);
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        bail!("template path '{}' must stay inside the project directory", rel);
    }
    Ok(())
}

impl TemplateInitializer for FileTemplates {
    fn ensure(&self, project_id: &str, project_path: &Path) -> Result<Vec<String>> {
        if !project_path.is_dir() {
            bail!("project directory {} does not exist", project_path.display());
        }

        let mut created = Vec::new();
        for (rel, contents) in &self.templates {
            check_relative(rel)?;
            let target = project_path.join(rel);
            if target.exists() {
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(&target, render(contents, project_id, project_path))
                .with_context(|| format!("writing {}", target.display()))?;
            debug!(project = %project_id, file = %rel, "template file created");
            created.push(rel.clone());
        }
        Ok(created)
    }
}
