//! chunkcached — a chunking proxy in front of a memcached-compatible
//! backend. Splits large values into fixed-size chunks so the backend's
//! slab allocator only ever sees uniformly sized items.

use std::sync::Arc;

use anyhow::{Context, Result};

use chunkcache_core::config::ChunkcachedConfig;
use chunkcache_engine::backend::BackendFactory;
use chunkcache_engine::metrics::Metrics;

use chunkcached::{server, status};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ChunkcachedConfig::load().context("failed to load configuration")?;
    tracing::info!(?config, "chunkcached starting");

    let metrics = Arc::new(Metrics::default());

    // Factories are built once at startup; each accepted connection builds
    // its own L1/L2 handler pair from them (§4.E, §5).
    let l1_factory = Arc::new(BackendFactory::new(&config.l1));
    let l2_factory = Arc::new(BackendFactory::new(&config.l2));

    let status_task = if config.status_port != 0 {
        let metrics = Arc::clone(&metrics);
        let port = config.status_port;
        Some(tokio::spawn(async move {
            if let Err(e) = status::serve(metrics, port).await {
                tracing::error!(error = %e, "status endpoint exited");
            }
        }))
    } else {
        None
    };

    let serve_result = server::serve(
        config.listener,
        config.chunking.chunk_size,
        l1_factory,
        l2_factory,
        metrics,
    )
    .await;

    if let Some(task) = status_task {
        task.abort();
    }

    serve_result
}
