pub mod error;
pub mod routes;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

pub use routes::{create_router, AppState};

pub async fn serve(state: Arc<AppState>, host: &str, port: u16, api_prefix: &str) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let app = create_router(state, api_prefix);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server keeps
/// running instead of shutting down straight away.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Cannot listen for shutdown signal, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
