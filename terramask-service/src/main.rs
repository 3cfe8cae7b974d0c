//! Terramask Service - HTTP microservice for terrain elevation and
//! line-of-sight queries.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `TERRAMASK_CACHE_FILE` | Elevation cache loaded at startup and by `POST /reload` | None |
//! | `TERRAMASK_HGT_DIR` | Directory of flat .hgt files preferred for point queries | None |
//! | `TERRAMASK_MASK_CACHE_SIZE` | Maximum masks kept in memory | 64 |
//! | `TERRAMASK_PORT` | HTTP server port | 8080 |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /elevation?lat=X&lon=Y` - Interpolated elevation at a point
//! - `GET /grid?lat=X&lon=Y&radius_km=R&resolution=N` - Elevation raster
//! - `GET /mask?lat=X&lon=Y&alt=A` - Terrain mask around a sensor
//! - `GET /visibility?sensor_lat=..&target_lat=..` - Line-of-sight verdict
//! - `POST /reload` - Reload the cache file
//! - `GET /health` - Health check
//! - `GET /stats` - Engine statistics

use std::net::SocketAddr;
use std::sync::Arc;

use terramask::TerrainEngineBuilder;
use terramask_service::{router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "terramask_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port: u16 = std::env::var("TERRAMASK_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The library handles TERRAMASK_CACHE_FILE, TERRAMASK_HGT_DIR and
    // TERRAMASK_MASK_CACHE_SIZE
    let engine = TerrainEngineBuilder::from_env().build();

    if !engine.is_loaded() && engine.hgt_dir().is_none() {
        tracing::warn!("No terrain loaded; set TERRAMASK_CACHE_FILE or TERRAMASK_HGT_DIR");
    }

    tracing::info!(
        cache_file = ?engine.cache_file(),
        hgt_dir = ?engine.hgt_dir(),
        loaded = engine.is_loaded(),
        mask_cache_capacity = engine.mask_cache_capacity(),
        port = port,
        "Starting terramask service"
    );

    let app = router(Arc::new(AppState { engine }));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
