//! HTTP server startup and shutdown

use anyhow::Result;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::core::AppState;

pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self) -> Result<()> {
        let port = self.state.config.http_port;
        let app = api::create_router(self.state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let addr = format!("0.0.0.0:{port}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("tavola-server listening on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down...");
            })
            .await?;
        Ok(())
    }
}
