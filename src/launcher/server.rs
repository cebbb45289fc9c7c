use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::routes::{self, LauncherState};
use super::ws;

/// The full launcher app: JSON API plus the lifecycle event relay.
pub fn launcher_router(state: LauncherState) -> Router {
    routes::api_router(state.clone())
        .merge(ws::ws_router(state))
        .layer(CorsLayer::permissive())
}

/// Serve on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    state: LauncherState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "launcher listening");
    }

    axum::serve(listener, launcher_router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    Ok(())
}
