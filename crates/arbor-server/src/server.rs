use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::router::build_router;
use crate::state::AppState;

/// The Arbor HTTP server.
pub struct ArborServer {
    config: ServerConfig,
    state: AppState,
}

impl ArborServer {
    /// Open the storage backends named by `config`.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let state = AppState::from_config(&config)?;
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        let router = build_router(self.state.clone());
        if self.config.cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "arbor server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("arbor server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for ArborServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArborServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
