//! Point and area elevation queries over any elevation source.

use crate::cache::ElevationCache;
use crate::geo::{degree_deltas, GeoPoint};
use crate::grid::NO_DATA_F64;
use crate::tile::HgtTile;

/// Anything that can answer an interpolated point elevation query.
///
/// Implementations return [`NO_DATA_F64`] for points they have no data
/// for; a missing answer is never an error.
pub trait ElevationSource {
    /// Elevation in metres at a point, or [`NO_DATA_F64`].
    fn elevation_at(&self, lat: f64, lon: f64) -> f64;

    /// Sample a square raster of `resolution × resolution` points around a
    /// centre. See [`grid_around`].
    fn grid_around(
        &self,
        center_lat: f64,
        center_lon: f64,
        radius_km: f64,
        resolution: usize,
    ) -> ElevationGridResult {
        grid_around(self, center_lat, center_lon, radius_km, resolution)
    }
}

impl ElevationSource for ElevationCache {
    fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        ElevationCache::elevation_at(self, lat, lon)
    }
}

impl ElevationSource for HgtTile {
    fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        HgtTile::elevation_at(self, lat, lon)
    }
}

/// A square elevation raster sampled around a centre point.
///
/// Samples are stored row by row starting at the southern row; within a row
/// `x` runs west to east. Samples farther than the radius from the centre
/// hold [`NO_DATA_F64`].
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGridResult {
    pub center: GeoPoint,
    pub radius_km: f64,
    /// Samples per side.
    pub resolution: usize,
    /// South-west corner of the raster.
    pub south_west: GeoPoint,
    /// North-east corner of the raster.
    pub north_east: GeoPoint,
    /// `elevations[y * resolution + x]`.
    pub elevations: Vec<f64>,
    /// Lowest valid sample, `None` if no sample had data.
    pub min_elevation: Option<f64>,
    /// Highest valid sample, `None` if no sample had data.
    pub max_elevation: Option<f64>,
}

impl ElevationGridResult {
    /// Sample at column `x` (west to east) and row `y` (south to north).
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.resolution || y >= self.resolution {
            return None;
        }
        self.elevations.get(y * self.resolution + x).copied()
    }

    /// Geographic position of the sample at `(x, y)`.
    pub fn position(&self, x: usize, y: usize) -> GeoPoint {
        let t = |i: usize| {
            if self.resolution <= 1 {
                0.5
            } else {
                i as f64 / (self.resolution - 1) as f64
            }
        };
        GeoPoint::new(
            self.south_west.lat + t(y) * (self.north_east.lat - self.south_west.lat),
            self.south_west.lon + t(x) * (self.north_east.lon - self.south_west.lon),
        )
    }

    /// Number of samples carrying data.
    pub fn valid_count(&self) -> usize {
        self.elevations
            .iter()
            .filter(|&&v| v != NO_DATA_F64)
            .count()
    }
}

/// Sample a square raster of `resolution × resolution` points spanning the
/// bounding box of a circle of `radius_km` around the centre.
///
/// Distance from the centre uses the planar approximation
/// `sqrt(dLat² + (dLon·cos(centerLat))²)·111.32` km. A resolution of 1
/// samples the centre only; 0 yields an empty raster.
pub fn grid_around<S: ElevationSource + ?Sized>(
    source: &S,
    center_lat: f64,
    center_lon: f64,
    radius_km: f64,
    resolution: usize,
) -> ElevationGridResult {
    let center = GeoPoint::new(center_lat, center_lon);
    let radius_km = radius_km.max(0.0);
    let (d_lat, d_lon) = degree_deltas(center_lat, radius_km);

    let mut result = ElevationGridResult {
        center,
        radius_km,
        resolution,
        south_west: GeoPoint::new(center_lat - d_lat, center_lon - d_lon),
        north_east: GeoPoint::new(center_lat + d_lat, center_lon + d_lon),
        elevations: Vec::with_capacity(resolution * resolution),
        min_elevation: None,
        max_elevation: None,
    };

    for y in 0..resolution {
        for x in 0..resolution {
            let point = result.position(x, y);
            let elevation = if center.planar_distance_m(&point) / 1000.0 > radius_km {
                NO_DATA_F64
            } else {
                source.elevation_at(point.lat, point.lon)
            };

            if elevation != NO_DATA_F64 {
                result.min_elevation =
                    Some(result.min_elevation.map_or(elevation, |m| m.min(elevation)));
                result.max_elevation =
                    Some(result.max_elevation.map_or(elevation, |m| m.max(elevation)));
            }
            result.elevations.push(elevation);
        }
    }

    result
}
