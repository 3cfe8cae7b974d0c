//! # terramask - Terrain Elevation & Line-of-Sight Masking
//!
//! Ingests DTED and SRTM elevation tiles, packs them into a compact
//! random-access cache, answers interpolated elevation queries and computes
//! curvature-corrected line-of-sight masks around sensors.
//!
//! ## Features
//!
//! - **Two tile formats**: DTED levels 0/1/2 and SRTM1/SRTM3 `.hgt`, decoded
//!   into one south-up, column-major grid
//! - **Single-file cache**: a whole region loads with one sequential read
//! - **Bilinear queries** that never blend real data with voids
//! - **Terrain masks** with per-bearing obstruction angles and visibility tests
//! - **Tile acquisition** from public SRTM stores (`download` feature)
//!
//! ## Quick Start
//!
//! ```ignore
//! use terramask::{cache, ElevationCache, GeoPoint, compute_mask};
//!
//! // Pack a DTED tree into a cache once
//! cache::build("/data/dted", "/data/aegean.dtc")?;
//!
//! // Load it and query
//! let terrain = ElevationCache::load("/data/aegean.dtc")?;
//! let elevation = terrain.elevation_at(38.5, 27.5);
//!
//! let sensor = GeoPoint::new(38.5, 27.5);
//! let mask = compute_mask(&terrain, sensor, elevation + 20.0, 30_000.0, 360, 200)?;
//! println!("Visible: {}", mask.is_visible(GeoPoint::new(38.6, 27.7), 400.0));
//! ```
//!
//! ## Conventions
//!
//! Tiles are 1° × 1° and named by their south-west corner. Missing data is
//! reported as [`NO_DATA`] (`-32767`), never as an error: a query outside the
//! loaded area, over an absent tile, or before anything is loaded returns
//! [`NO_DATA_F64`].

pub mod cache;
pub mod coverage;
pub mod engine;
pub mod error;
pub mod filename;
pub mod geo;
pub mod grid;
pub mod mask;
pub mod query;
pub mod tile;

#[cfg(feature = "download")]
pub mod download;

// Re-export main types at crate root for convenience
pub use cache::{BuildReport, CacheHeader, CacheVersion, ElevationCache};
pub use coverage::{tiles_covering, TileBounds, TileKey};
pub use engine::{CacheStats, TerrainEngine, TerrainEngineBuilder};
pub use error::{Result, TerrainError};
pub use geo::GeoPoint;
pub use grid::{ElevationGrid, PostGrid, NO_DATA, NO_DATA_F64};
pub use mask::{compute_mask, ProfileSample, TerrainMask, TerrainProfile};
pub use query::{ElevationGridResult, ElevationSource};
pub use tile::{HgtTile, TileFormat};
