use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::launcher::{server, LauncherState};
use crate::lifecycle::PortRange;
use crate::projects::ProjectRegistry;
use crate::ui::summary::print_launcher_summary;

use super::Workspace;

/// Upper bound on waiting for instances (and in-flight spawns) at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn run(config_file: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let workspace = Workspace::load(config_file)?;
    let manager = workspace.manager()?;
    let projects = workspace.projects();

    let host = host.unwrap_or_else(|| workspace.config.launcher.host.clone());
    let port = port.unwrap_or(workspace.config.launcher.port);
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding launcher to {}:{}", host, port))?;
    let url = format!("http://{}", listener.local_addr()?);

    print_launcher_summary(
        &url,
        &projects.list(),
        &PortRange::from_config(&workspace.config.ports),
    );

    let state = LauncherState {
        manager: manager.clone(),
        projects: Arc::new(projects),
    };
    let cancel = CancellationToken::new();
    let server = tokio::spawn(server::serve(listener, state, cancel.clone()));

    tokio::signal::ctrl_c().await.ok();
    eprintln!("\nShutting down...");

    cancel.cancel();
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, manager.shutdown()).await {
        Ok(()) => info!("all instances stopped cleanly"),
        Err(_) => warn!("shutdown timed out -- some instances may still be running"),
    }

    server.await.context("launcher server task")??;
    Ok(())
}
