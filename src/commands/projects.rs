use anyhow::Result;
use std::path::Path;

use crate::lifecycle::InstanceState;
use crate::projects::ProjectRegistry;
use crate::ui::summary::print_projects;

use super::Workspace;

pub fn run(config_file: Option<&Path>) -> Result<()> {
    let workspace = Workspace::load(config_file)?;
    let rows: Vec<_> = workspace
        .projects()
        .list()
        .into_iter()
        .map(|p| (p, InstanceState::Idle))
        .collect();
    print_projects(&rows);
    Ok(())
}
