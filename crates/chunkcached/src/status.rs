//! [AMBIENT] HTTP status/introspection endpoint, grounded in
//! `summitd::status::serve` — same `Router` + `TcpListener` shape, same
//! "one route, one JSON body" scope. Exposes only the raw counters named
//! in §6's metric surface; histograms/percentiles are an external
//! collaborator's job.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use chunkcache_engine::metrics::{Metrics, MetricsSnapshot};

async fn handle_status(State(metrics): State<Arc<Metrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}

pub async fn serve(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
    let app = Router::new()
        .route("/status", get(handle_status))
        .with_state(metrics)
        .layer(cors);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "status endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}
