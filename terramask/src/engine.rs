//! Terrain engine with a swappable cache and memoised masks.
//!
//! [`TerrainEngine`] is the handle collaborators hold on to. It owns the
//! currently loaded [`ElevationCache`] behind an `Arc` that reloads replace
//! wholesale, an optional directory of flat SRTM tiles that takes precedence
//! for point queries, and a bounded cache of computed [`TerrainMask`]s.
//!
//! # Example
//!
//! ```ignore
//! use terramask::{GeoPoint, TerrainEngineBuilder};
//!
//! let engine = TerrainEngineBuilder::new()
//!     .cache_file("/data/aegean.dtc")
//!     .hgt_dir("/data/srtm")
//!     .build();
//!
//! let elevation = engine.elevation_at(38.5, 27.5);
//! let mask = engine.mask(GeoPoint::new(38.5, 27.5), 150.0, 30_000.0, 360, 200)?;
//! println!("Visible: {}", mask.is_visible(GeoPoint::new(38.6, 27.7), 400.0));
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use moka::sync::Cache;

use crate::cache::ElevationCache;
use crate::error::{Result, TerrainError};
use crate::filename::coords_to_filename;
use crate::geo::GeoPoint;
use crate::grid::NO_DATA_F64;
use crate::mask::{self, TerrainMask};
use crate::query::ElevationSource;
use crate::tile::HgtTile;

/// Default number of masks kept by [`TerrainEngine::mask`].
pub const DEFAULT_MASK_CACHE_SIZE: u64 = 64;

/// Statistics about mask cache usage.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of masks currently cached.
    pub entry_count: u64,
    /// Number of mask requests served from the cache.
    pub hit_count: u64,
    /// Number of masks computed.
    pub miss_count: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

/// Masks are only reusable for the exact same inputs and terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MaskKey {
    lat: u64,
    lon: u64,
    alt: u64,
    range: u64,
    num_azimuths: usize,
    num_samples: usize,
    cache_version: u64,
}

/// Elevation and line-of-sight queries over the currently loaded terrain.
///
/// Queries made before any cache is loaded behave as if every point were
/// outside the terrain: they return [`NO_DATA_F64`] rather than failing.
pub struct TerrainEngine {
    cache: RwLock<Option<Arc<ElevationCache>>>,
    /// File reloaded by [`reload`](Self::reload).
    cache_file: Option<PathBuf>,
    /// Flat SRTM directory consulted before the cache.
    hgt_dir: Option<PathBuf>,
    /// Incremented on every successful load or swap.
    cache_version: AtomicU64,
    masks: Cache<MaskKey, Arc<TerrainMask>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl std::fmt::Debug for TerrainEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainEngine")
            .field("loaded", &self.is_loaded())
            .field("cache_version", &self.cache_version())
            .field("cache_file", &self.cache_file)
            .field("hgt_dir", &self.hgt_dir)
            .field("cached_masks", &self.masks.entry_count())
            .finish()
    }
}

impl Default for TerrainEngine {
    fn default() -> Self {
        TerrainEngineBuilder::new().build()
    }
}

impl TerrainEngine {
    /// Create an engine with no terrain loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder for more configuration options.
    pub fn builder() -> TerrainEngineBuilder {
        TerrainEngineBuilder::new()
    }

    /// Load a cache file and make it current.
    ///
    /// On failure the previously loaded cache, if any, stays in place.
    pub fn try_load_cache<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let cache = ElevationCache::load(path)?;
        self.swap_cache(Arc::new(cache));
        Ok(())
    }

    /// Load a cache file, logging any error.
    ///
    /// Returns `true` if the cache was loaded.
    pub fn load_cache<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        match self.try_load_cache(path) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to load elevation cache");
                false
            }
        }
    }

    /// Reload the cache file the engine was built with.
    ///
    /// Returns the new cache version. On failure the current cache keeps
    /// serving queries.
    pub fn reload(&self) -> Result<u64> {
        let path = self
            .cache_file
            .as_ref()
            .ok_or_else(|| TerrainError::InvalidParameter {
                name: "cache_file",
                reason: "no cache file configured".to_string(),
            })?;
        let cache = ElevationCache::load(path)?;
        tracing::info!(path = %path.display(), tiles = cache.present_count(), "Elevation cache reloaded");
        Ok(self.swap_cache(Arc::new(cache)))
    }

    /// Install an already loaded cache.
    ///
    /// Queries running against the previous cache finish on it undisturbed.
    /// Returns the new cache version.
    pub fn swap_cache(&self, cache: Arc<ElevationCache>) -> u64 {
        {
            let mut current = self.cache.write().unwrap_or_else(|e| e.into_inner());
            *current = Some(cache);
        }
        let version = self.cache_version.fetch_add(1, Ordering::AcqRel) + 1;
        // Masks keyed on older versions can never be hit again
        self.masks.invalidate_all();
        tracing::info!(version, "Elevation cache swapped in");
        version
    }

    /// The current cache, if one has been loaded.
    pub fn cache(&self) -> Option<Arc<ElevationCache>> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.cache().is_some()
    }

    /// Number of caches installed so far, 0 while nothing is loaded.
    pub fn cache_version(&self) -> u64 {
        self.cache_version.load(Ordering::Acquire)
    }

    /// Cache file configured at build time.
    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    /// Get the high-resolution override directory.
    pub fn hgt_dir(&self) -> Option<&Path> {
        self.hgt_dir.as_deref()
    }

    /// Interpolated elevation at a point.
    ///
    /// With an HGT directory configured, the flat tile covering the point is
    /// opened and read directly when it exists; otherwise the loaded cache
    /// answers. Returns [`NO_DATA_F64`] when neither has data.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        if !lat.is_finite() || !lon.is_finite() {
            return NO_DATA_F64;
        }

        if let Some(elevation) = self.hgt_elevation(lat, lon) {
            return elevation;
        }

        match self.cache() {
            Some(cache) => cache.elevation_at(lat, lon),
            None => NO_DATA_F64,
        }
    }

    fn hgt_elevation(&self, lat: f64, lon: f64) -> Option<f64> {
        let dir = self.hgt_dir.as_ref()?;
        let (tile_lat, tile_lon) = (lat.floor() as i32, lon.floor() as i32);
        let path = dir.join(coords_to_filename(tile_lat, tile_lon));
        if !path.is_file() {
            return None;
        }

        match HgtTile::open(&path, tile_lat, tile_lon) {
            Ok(tile) => Some(tile.elevation_at(lat, lon)),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Unreadable HGT tile, using cache");
                None
            }
        }
    }

    /// Compute a terrain mask against the current terrain. Never cached.
    pub fn compute_mask(
        &self,
        sensor: GeoPoint,
        sensor_alt_msl: f64,
        max_range_m: f64,
        num_azimuths: usize,
        num_samples: usize,
    ) -> Result<TerrainMask> {
        mask::compute_mask(
            self,
            sensor,
            sensor_alt_msl,
            max_range_m,
            num_azimuths,
            num_samples,
        )
    }

    /// Like [`compute_mask`](Self::compute_mask), but reuses a mask computed
    /// earlier for the same inputs and cache version.
    pub fn mask(
        &self,
        sensor: GeoPoint,
        sensor_alt_msl: f64,
        max_range_m: f64,
        num_azimuths: usize,
        num_samples: usize,
    ) -> Result<Arc<TerrainMask>> {
        let key = MaskKey {
            lat: sensor.lat.to_bits(),
            lon: sensor.lon.to_bits(),
            alt: sensor_alt_msl.to_bits(),
            range: max_range_m.to_bits(),
            num_azimuths,
            num_samples,
            cache_version: self.cache_version(),
        };

        if let Some(mask) = self.masks.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(mask);
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let mask = Arc::new(self.compute_mask(
            sensor,
            sensor_alt_msl,
            max_range_m,
            num_azimuths,
            num_samples,
        )?);
        self.masks.insert(key, mask.clone());
        Ok(mask)
    }

    /// Get mask cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.masks.entry_count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }

    /// Get the maximum number of cached masks.
    pub fn mask_cache_capacity(&self) -> u64 {
        self.masks.policy().max_capacity().unwrap_or(0)
    }

    /// Drop every cached mask.
    pub fn clear_masks(&self) {
        self.masks.invalidate_all();
    }
}

impl ElevationSource for TerrainEngine {
    fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        TerrainEngine::elevation_at(self, lat, lon)
    }
}

/// Builder for creating [`TerrainEngine`] with custom configuration.
///
/// # Example
///
/// ```ignore
/// use terramask::TerrainEngineBuilder;
///
/// let engine = TerrainEngineBuilder::from_env()
///     .mask_cache_size(16)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TerrainEngineBuilder {
    cache_file: Option<PathBuf>,
    hgt_dir: Option<PathBuf>,
    mask_cache_size: u64,
}

impl Default for TerrainEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainEngineBuilder {
    pub fn new() -> Self {
        Self {
            cache_file: None,
            hgt_dir: None,
            mask_cache_size: DEFAULT_MASK_CACHE_SIZE,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `TERRAMASK_CACHE_FILE` | Cache file loaded by [`build`](Self::build) | None |
    /// | `TERRAMASK_HGT_DIR` | Flat SRTM directory for point queries | None |
    /// | `TERRAMASK_MASK_CACHE_SIZE` | Maximum masks kept in memory | 64 |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Self {
            cache_file: non_empty("TERRAMASK_CACHE_FILE").map(PathBuf::from),
            hgt_dir: non_empty("TERRAMASK_HGT_DIR").map(PathBuf::from),
            mask_cache_size: non_empty("TERRAMASK_MASK_CACHE_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MASK_CACHE_SIZE),
        }
    }

    /// Cache file to load when the engine is built.
    pub fn cache_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Flat SRTM directory whose tiles take precedence over the cache.
    pub fn hgt_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.hgt_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the maximum number of masks to keep in memory.
    ///
    /// Default is 64 masks.
    pub fn mask_cache_size(mut self, size: u64) -> Self {
        self.mask_cache_size = size;
        self
    }

    /// Build the [`TerrainEngine`].
    ///
    /// A configured cache file that fails to load is logged and leaves the
    /// engine empty; use [`TerrainEngine::try_load_cache`] to handle the
    /// error yourself.
    pub fn build(self) -> TerrainEngine {
        let engine = TerrainEngine {
            cache: RwLock::new(None),
            cache_file: self.cache_file,
            hgt_dir: self.hgt_dir,
            cache_version: AtomicU64::new(0),
            masks: Cache::builder().max_capacity(self.mask_cache_size).build(),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        };

        if let Some(path) = &engine.cache_file {
            engine.load_cache(path);
        }

        engine
    }
}
