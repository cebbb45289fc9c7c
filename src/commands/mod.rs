pub mod init;
pub mod open;
pub mod projects;
pub mod serve;
pub mod validate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::config::model::ProjdeckConfig;
use crate::config::resolve::resolve_config;
use crate::lifecycle::{InstanceManager, ManagerSettings};
use crate::projects::ConfigProjects;
use crate::template::{FileTemplates, TemplateInitializer};

/// A resolved, validated config file plus everything derived from it.
pub struct Workspace {
    pub config: ProjdeckConfig,
    pub config_path: PathBuf,
    pub config_dir: PathBuf,
}

impl Workspace {
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config(config_file)?;
        let config = config::load_validated(&config_path)?;
        let config_dir = config::config_dir(&config_path);
        Ok(Self {
            config,
            config_path,
            config_dir,
        })
    }

    pub fn projects(&self) -> ConfigProjects {
        ConfigProjects::from_config(&self.config, &self.config_dir)
    }

    pub fn manager(&self) -> Result<InstanceManager> {
        let settings = ManagerSettings::from_config(&self.config, &self.config_dir)
            .with_context(|| format!("reading settings from {}", self.config_path.display()))?;
        let templates: Arc<dyn TemplateInitializer> =
            Arc::new(FileTemplates::new(self.config.templates.clone()));
        Ok(InstanceManager::new(settings, Some(templates)))
    }
}
