//! API Server

use super::{
    handlers::AppState,
    middleware::{cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ServerConfig;
use crate::game::engine::CrashGame;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: ServerConfig,
    game: CrashGame,
}

impl ApiServer {
    pub fn new(config: ServerConfig, game: CrashGame) -> Self {
        Self { config, game }
    }

    /// Bind the configured address and serve until Ctrl+C / SIGTERM
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;

        info!(
            %addr,
            cors = ?self.config.allowed_origins,
            request_timeout_secs = self.config.request_timeout_secs,
            "🌐 Crash game server listening (REST: /health /status /rounds /metrics, game: /ws)"
        );

        self.serve(listener, shutdown_signal()).await?;
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let game = self.game.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        game.shutdown().await;
        info!("🛑 Server stopped gracefully");
        Ok(())
    }

    /// The application with its middleware stack
    pub fn router(&self) -> axum::Router {
        let state = Arc::new(AppState {
            game: self.game.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        create_router(state)
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(cors_layer(&self.config))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.host.parse::<std::net::IpAddr>()?,
            self.config.port,
        )))
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix. A signal that cannot be
/// installed simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C"),
            Err(e) => {
                warn!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
