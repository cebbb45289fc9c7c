use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::broadcast;

use crate::identity::adhoc_project;
use crate::lifecycle::LifecycleEvent;
use crate::projects::{unknown_project_message, Project, ProjectRegistry};
use crate::ui::logs::LogWriter;
use crate::ui::summary::print_instance_summary;

use super::Workspace;

pub async fn run(
    config_file: Option<&Path>,
    project: Option<String>,
    path: Option<PathBuf>,
) -> Result<()> {
    let workspace = Workspace::load(config_file)?;
    let registry = workspace.projects();

    let project: Project = match (project, path) {
        (_, Some(dir)) => adhoc_project(&dir)
            .with_context(|| format!("opening project directory {}", dir.display()))?,
        (Some(id), None) => registry
            .get(&id)
            .ok_or_else(|| anyhow!(unknown_project_message(&registry, &id)))?,
        (None, None) => bail!("specify a project id or --path <dir>"),
    };

    let manager = workspace.manager()?;
    let mut events = manager.subscribe();
    let writer = tokio::spawn(LogWriter::new(manager.subscribe_logs()).run());

    let info = manager.spawn_instance(&project.id, &project.path).await?;
    print_instance_summary(&project, &info);

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nShutting down...");
            manager.shutdown().await;
            Ok(())
        }
        ended = instance_ended(&mut events, &project.id) => ended,
    };

    writer.abort();
    result
}

/// Resolve when the instance for `project_id` goes away on its own.
async fn instance_ended(
    events: &mut broadcast::Receiver<LifecycleEvent>,
    project_id: &str,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(LifecycleEvent::Crashed {
                project_id: id,
                error,
                ..
            }) if id == project_id => bail!(error),
            Ok(LifecycleEvent::Stopped {
                project_id: id,
                exit_code,
            }) if id == project_id => {
                eprintln!(
                    "Instance exited{}",
                    exit_code
                        .map(|c| format!(" with code {}", c))
                        .unwrap_or_default()
                );
                return Ok(());
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}
