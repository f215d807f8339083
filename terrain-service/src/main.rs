//! Terrain Service - HTTP microservice for terrain height queries.
//!
//! Coordinate lookups from all clients share one batching engine, so bursts
//! of requests are answered with few reads of the underlying tiles.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TERRAIN_DATA_DIR` | Directory containing .hgt files | Current directory |
//! | `TERRAIN_CACHE_SIZE` | Maximum tiles in cache | 100 |
//! | `TERRAIN_BATCH_WINDOW_MS` | Coalescing window in milliseconds | 500 |
//! | `TERRAIN_PORT` | HTTP server port | 8080 |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /elevation?lat=X&lon=Y` - Height at a coordinate
//! - `POST /elevation` - Heights for a list of coordinates
//! - `POST /elevation/geojson` - GeoJSON geometry with heights as Z
//! - `POST /path`, `POST /polypath` - Height profiles
//! - `POST /carpet` - Height grid over an area
//! - `GET /health` - Health check
//! - `GET /stats` - Engine and cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use terrain::{BatchConfig, SrtmTransportBuilder};
use terrain_service::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "terrain_service=info,terrain=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = std::env::var("TERRAIN_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let transport = match SrtmTransportBuilder::from_env() {
        Ok(builder) => builder.build(),
        Err(_) => {
            tracing::warn!("TERRAIN_DATA_DIR not set, using current directory");
            SrtmTransportBuilder::new(".").build()
        }
    };
    let config = BatchConfig::from_env();

    tracing::info!(
        data_dir = %transport.data_dir().display(),
        cache_capacity = transport.cache_capacity(),
        batch_window_ms = config.window.as_millis() as u64,
        port = port,
        "Starting terrain service"
    );

    let state = Arc::new(AppState::new(transport, config));
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
