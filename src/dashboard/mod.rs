//! Operator dashboard: a small HTTP API over the queue service plus a
//! WebSocket push channel.
//!
//! CORS is open; the dashboard is meant for a trusted network.

pub mod push;
pub mod routes;

use std::future::Future;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::DashboardConfig;
use crate::engine::QueueService;
use crate::error::Result;

/// Shared state for every dashboard handler.
#[derive(Clone)]
pub struct DashboardState {
    pub service: QueueService,
    /// Period of the `stats` push on each WebSocket.
    pub stats_push_interval: Duration,
}

impl DashboardState {
    pub fn new(service: QueueService, config: &DashboardConfig) -> Self {
        Self {
            service,
            stats_push_interval: config.stats_push_interval,
        }
    }
}

/// Build the dashboard router.
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/queue-stats", get(routes::queue_stats))
        .route("/queue-delete/:id", post(routes::queue_delete))
        .route("/queue-clear", post(routes::queue_clear))
        .route("/queue-purge/:max_priority", post(routes::queue_purge))
        .route("/ws", get(push::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the dashboard on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: DashboardState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "dashboard listening");
    info!("stats:     http://{addr}/queue-stats");
    info!("websocket: ws://{addr}/ws");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("dashboard stopped");
    Ok(())
}
