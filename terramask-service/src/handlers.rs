//! HTTP request handlers for the terrain service.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use terramask::{ElevationSource, GeoPoint, TerrainError, TerrainMask, NO_DATA_F64};

use crate::AppState;

/// Largest grid side accepted by `/grid`.
pub const MAX_GRID_RESOLUTION: usize = 512;
/// Largest azimuth count accepted by `/mask` and `/visibility`.
pub const MAX_AZIMUTHS: usize = 3600;
/// Largest per-azimuth sample count accepted by `/mask` and `/visibility`.
pub const MAX_SAMPLES: usize = 5000;

fn default_range_m() -> f64 {
    30_000.0
}

fn default_azimuths() -> usize {
    360
}

fn default_samples() -> usize {
    200
}

fn default_resolution() -> usize {
    64
}

/// Query parameters for the elevation endpoint.
#[derive(Debug, Deserialize)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

/// Elevation at a point. `elevation` is null where there is no data.
#[derive(Debug, Serialize)]
pub struct ElevationResponse {
    pub elevation: Option<f64>,
    pub lat: f64,
    pub lon: f64,
}

/// Query parameters for the grid endpoint.
#[derive(Debug, Deserialize)]
pub struct GridQuery {
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
    /// Samples per side.
    #[serde(default = "default_resolution")]
    pub resolution: usize,
}

#[derive(Debug, Serialize)]
pub struct PointResponse {
    pub lat: f64,
    pub lon: f64,
}

impl From<GeoPoint> for PointResponse {
    fn from(point: GeoPoint) -> Self {
        Self {
            lat: point.lat,
            lon: point.lon,
        }
    }
}

/// Elevation raster around a point, rows south to north.
#[derive(Debug, Serialize)]
pub struct GridResponse {
    pub center: PointResponse,
    pub radius_km: f64,
    pub resolution: usize,
    pub south_west: PointResponse,
    pub north_east: PointResponse,
    /// Row-major samples; null outside the radius or where there is no data.
    pub elevations: Vec<Option<f64>>,
    pub min_elevation: Option<f64>,
    pub max_elevation: Option<f64>,
}

/// Query parameters for the mask endpoint.
#[derive(Debug, Deserialize)]
pub struct MaskQuery {
    pub lat: f64,
    pub lon: f64,
    /// Sensor altitude in metres MSL.
    pub alt: f64,
    #[serde(default = "default_range_m")]
    pub range_m: f64,
    #[serde(default = "default_azimuths")]
    pub azimuths: usize,
    #[serde(default = "default_samples")]
    pub samples: usize,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub azimuth_deg: f64,
    pub mask_angle_deg: f64,
    pub obstruction_distance_m: f64,
    pub obstruction_elevation_m: f64,
}

/// A computed terrain mask.
#[derive(Debug, Serialize)]
pub struct MaskResponse {
    pub sensor: PointResponse,
    pub sensor_alt_msl: f64,
    pub max_range_m: f64,
    pub num_samples: usize,
    pub azimuth_step_deg: f64,
    pub cache_version: u64,
    pub profiles: Vec<ProfileResponse>,
}

impl MaskResponse {
    fn new(mask: &TerrainMask, cache_version: u64) -> Self {
        Self {
            sensor: mask.sensor().into(),
            sensor_alt_msl: mask.sensor_alt_msl(),
            max_range_m: mask.max_range_m(),
            num_samples: mask.num_samples(),
            azimuth_step_deg: mask.azimuth_step_deg(),
            cache_version,
            profiles: mask
                .profiles()
                .iter()
                .map(|p| {
                    let obstruction = p.obstruction();
                    ProfileResponse {
                        azimuth_deg: p.azimuth_deg,
                        mask_angle_deg: p.mask_angle_deg,
                        obstruction_distance_m: obstruction.distance_m,
                        obstruction_elevation_m: obstruction.elevation_m,
                    }
                })
                .collect(),
        }
    }
}

/// Query parameters for the visibility endpoint.
#[derive(Debug, Deserialize)]
pub struct VisibilityQuery {
    pub sensor_lat: f64,
    pub sensor_lon: f64,
    pub sensor_alt: f64,
    pub target_lat: f64,
    pub target_lon: f64,
    pub target_alt: f64,
    #[serde(default = "default_range_m")]
    pub range_m: f64,
    #[serde(default = "default_azimuths")]
    pub azimuths: usize,
    #[serde(default = "default_samples")]
    pub samples: usize,
}

/// Visibility verdict for one target.
#[derive(Debug, Serialize)]
pub struct VisibilityResponse {
    pub visible: bool,
    pub bearing_deg: f64,
    pub distance_m: f64,
    pub elevation_angle_deg: f64,
    pub mask_angle_deg: f64,
    /// Elevation angle minus mask angle; positive when visible.
    pub margin_deg: f64,
}

/// Result of a cache reload.
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub cache_version: u64,
    pub tiles_present: usize,
    pub min_lon: i32,
    pub min_lat: i32,
    pub max_lon: i32,
    pub max_lat: i32,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Whether an elevation cache is loaded.
    pub loaded: bool,
}

/// Engine statistics response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub loaded: bool,
    pub cache_version: u64,
    pub tiles_present: usize,
    /// Number of masks in the mask cache.
    pub cached_masks: u64,
    pub mask_cache_capacity: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Mask cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

/// A failed request, rendered as an [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<TerrainError> for ApiError {
    fn from(e: TerrainError) -> Self {
        match e {
            TerrainError::InvalidParameter { .. } => Self::bad_request(e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "Request failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.message, "Request rejected");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn check_limits(azimuths: usize, samples: usize) -> Result<(), ApiError> {
    if azimuths > MAX_AZIMUTHS {
        return Err(ApiError::bad_request(format!(
            "azimuths must be at most {}",
            MAX_AZIMUTHS
        )));
    }
    if samples > MAX_SAMPLES {
        return Err(ApiError::bad_request(format!(
            "samples must be at most {}",
            MAX_SAMPLES
        )));
    }
    Ok(())
}

/// Mask for the given sensor, computed on the blocking pool.
async fn sensor_mask(
    state: Arc<AppState>,
    sensor: GeoPoint,
    alt: f64,
    range_m: f64,
    azimuths: usize,
    samples: usize,
) -> Result<Arc<TerrainMask>, ApiError> {
    check_limits(azimuths, samples)?;
    tokio::task::spawn_blocking(move || {
        state.engine.mask(sensor, alt, range_m, azimuths, samples)
    })
    .await
    .map_err(|e| ApiError::internal(format!("mask task failed: {}", e)))?
    .map_err(ApiError::from)
}

fn elevation_value(raw: f64) -> Option<f64> {
    (raw != NO_DATA_F64).then_some(raw)
}

/// Get elevation for given coordinates.
///
/// # Returns
///
/// - `200 OK` with the elevation, null where no terrain covers the point
/// - `400 Bad Request` if the query string is malformed
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Json<ElevationResponse> {
    let elevation = elevation_value(state.engine.elevation_at(query.lat, query.lon));
    tracing::debug!(lat = query.lat, lon = query.lon, ?elevation, "Elevation query");

    Json(ElevationResponse {
        elevation,
        lat: query.lat,
        lon: query.lon,
    })
}

/// Sample a square elevation raster around a point.
///
/// # Returns
///
/// - `200 OK` with the raster
/// - `400 Bad Request` for a non-positive radius or an out-of-range resolution
pub async fn get_grid(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GridQuery>,
) -> Result<Json<GridResponse>, ApiError> {
    if !query.lat.is_finite() || !query.lon.is_finite() {
        return Err(ApiError::bad_request("lat and lon must be finite"));
    }
    if !query.radius_km.is_finite() || query.radius_km <= 0.0 {
        return Err(ApiError::bad_request("radius_km must be positive"));
    }
    if query.resolution == 0 || query.resolution > MAX_GRID_RESOLUTION {
        return Err(ApiError::bad_request(format!(
            "resolution must be between 1 and {}",
            MAX_GRID_RESOLUTION
        )));
    }

    let grid = state
        .engine
        .grid_around(query.lat, query.lon, query.radius_km, query.resolution);

    Ok(Json(GridResponse {
        center: grid.center.into(),
        radius_km: grid.radius_km,
        resolution: grid.resolution,
        south_west: grid.south_west.into(),
        north_east: grid.north_east.into(),
        elevations: grid.elevations.iter().map(|&v| elevation_value(v)).collect(),
        min_elevation: grid.min_elevation,
        max_elevation: grid.max_elevation,
    }))
}

/// Compute (or reuse) the terrain mask around a sensor.
///
/// # Returns
///
/// - `200 OK` with one profile per azimuth
/// - `400 Bad Request` for invalid sensor or sampling parameters
pub async fn get_mask(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MaskQuery>,
) -> Result<Json<MaskResponse>, ApiError> {
    let version = state.engine.cache_version();
    let mask = sensor_mask(
        state,
        GeoPoint::new(query.lat, query.lon),
        query.alt,
        query.range_m,
        query.azimuths,
        query.samples,
    )
    .await?;

    Ok(Json(MaskResponse::new(&mask, version)))
}

/// Decide whether a target is visible from a sensor.
///
/// # Returns
///
/// - `200 OK` with the verdict and the angles behind it
/// - `400 Bad Request` for invalid parameters
pub async fn get_visibility(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VisibilityQuery>,
) -> Result<Json<VisibilityResponse>, ApiError> {
    if !query.target_lat.is_finite() || !query.target_lon.is_finite() {
        return Err(ApiError::bad_request("target_lat and target_lon must be finite"));
    }
    if !query.target_alt.is_finite() {
        return Err(ApiError::bad_request("target_alt must be finite"));
    }

    let sensor = GeoPoint::new(query.sensor_lat, query.sensor_lon);
    let target = GeoPoint::new(query.target_lat, query.target_lon);
    let mask = sensor_mask(
        state,
        sensor,
        query.sensor_alt,
        query.range_m,
        query.azimuths,
        query.samples,
    )
    .await?;

    let bearing_deg = sensor.bearing_deg(&target);
    let elevation_angle_deg = mask.elevation_angle_to(target, query.target_alt);
    let mask_angle_deg = mask.mask_angle_at(bearing_deg);
    let margin_deg = elevation_angle_deg - mask_angle_deg;

    Ok(Json(VisibilityResponse {
        visible: margin_deg > 0.0,
        bearing_deg,
        distance_m: sensor.planar_distance_m(&target),
        elevation_angle_deg,
        mask_angle_deg,
        margin_deg,
    }))
}

/// Reload the configured cache file.
///
/// # Returns
///
/// - `200 OK` with the new cache version and coverage
/// - `400 Bad Request` if the service has no cache file configured
/// - `503 Service Unavailable` if the file can't be loaded; the previous
///   terrain keeps serving
pub async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<ReloadResponse>, ApiError> {
    let engine_state = state.clone();
    let version = tokio::task::spawn_blocking(move || engine_state.engine.reload())
        .await
        .map_err(|e| ApiError::internal(format!("reload task failed: {}", e)))?
        .map_err(|e| match e {
            TerrainError::InvalidParameter { .. } => ApiError::from(e),
            other => ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: other.to_string(),
            },
        })?;

    let cache = state
        .engine
        .cache()
        .ok_or_else(|| ApiError::internal("cache missing after reload"))?;
    let bounds = cache.bounds();

    Ok(Json(ReloadResponse {
        cache_version: version,
        tiles_present: cache.present_count(),
        min_lon: bounds.min_lon,
        min_lat: bounds.min_lat,
        max_lon: bounds.max_lon,
        max_lat: bounds.max_lat,
    }))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        loaded: state.engine.is_loaded(),
    })
}

/// Engine and mask cache statistics.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.engine.cache_stats();
    let tiles_present = state
        .engine
        .cache()
        .map(|c| c.present_count())
        .unwrap_or(0);

    Json(StatsResponse {
        loaded: state.engine.is_loaded(),
        cache_version: state.engine.cache_version(),
        tiles_present,
        cached_masks: stats.entry_count,
        mask_cache_capacity: state.engine.mask_cache_capacity(),
        cache_hits: stats.hit_count,
        cache_misses: stats.miss_count,
        hit_rate: stats.hit_rate(),
    })
}
