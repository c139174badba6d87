//! HTTP metrics endpoint
//!
//! - `GET /metrics` - Prometheus text exposition of index statistics
//!
//! ```ignore
//! use geodb_server::transport::http::run_server;
//!
//! run_server(listener, index, shutdown).await?;
//! ```

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use geodb::SpatialIndex;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Result, ServerError};
use crate::metrics;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub fn router(index: Arc<SpatialIndex>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(index)
}

async fn metrics_handler(State(index): State<Arc<SpatialIndex>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], metrics::render(&index.stats()))
}

/// Serve the metrics endpoint until `shutdown` is cancelled.
pub async fn run_server(
    listener: TcpListener,
    index: Arc<SpatialIndex>,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("GeoDB metrics listening on http://{}/metrics", addr);
    }

    axum::serve(listener, router(index))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}
