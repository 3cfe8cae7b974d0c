//! Tile keys, tile rectangles and circular area enumeration.

use std::collections::BTreeSet;

use crate::geo::{degree_deltas, GeoPoint};

/// Westernmost and easternmost tile longitudes.
pub const MIN_TILE_LON: i32 = -180;
pub const MAX_TILE_LON: i32 = 179;

/// Southernmost and northernmost tile latitudes.
pub const MIN_TILE_LAT: i32 = -90;
pub const MAX_TILE_LAT: i32 = 89;

/// A 1° × 1° tile, identified by the integer longitude and latitude of its
/// southwest corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileKey {
    pub lon: i32,
    pub lat: i32,
}

impl TileKey {
    pub fn new(lon: i32, lat: i32) -> Self {
        Self { lon, lat }
    }

    /// The tile containing a point.
    pub fn containing(lat: f64, lon: f64) -> Self {
        Self {
            lon: lon.floor() as i32,
            lat: lat.floor() as i32,
        }
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lon, self.lat)
    }
}

/// An inclusive rectangle of tiles, `[min_lon..=max_lon] × [min_lat..=max_lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileBounds {
    pub min_lon: i32,
    pub min_lat: i32,
    pub max_lon: i32,
    pub max_lat: i32,
}

impl TileBounds {
    /// Create bounds from inclusive corners.
    pub fn new(min_lon: i32, min_lat: i32, max_lon: i32, max_lat: i32) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Check that the corners are ordered and every tile lies on the globe,
    /// i.e. lon in -180..=179 and lat in -90..=89.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_lon < self.min_lon || self.max_lat < self.min_lat {
            return Err(format!(
                "inverted bounds lon {}..{} lat {}..{}",
                self.min_lon, self.max_lon, self.min_lat, self.max_lat
            ));
        }
        if self.min_lon < MIN_TILE_LON
            || self.max_lon > MAX_TILE_LON
            || self.min_lat < MIN_TILE_LAT
            || self.max_lat > MAX_TILE_LAT
        {
            return Err(format!(
                "bounds lon {}..{} lat {}..{} leave the globe",
                self.min_lon, self.max_lon, self.min_lat, self.max_lat
            ));
        }
        Ok(())
    }

    /// Smallest rectangle holding every key, or `None` for no keys.
    pub fn enclosing<I: IntoIterator<Item = TileKey>>(keys: I) -> Option<Self> {
        keys.into_iter().fold(None, |acc, key| {
            Some(match acc {
                None => Self::new(key.lon, key.lat, key.lon, key.lat),
                Some(b) => Self::new(
                    b.min_lon.min(key.lon),
                    b.min_lat.min(key.lat),
                    b.max_lon.max(key.lon),
                    b.max_lat.max(key.lat),
                ),
            })
        })
    }

    /// Number of tile columns (longitudes).
    pub fn cols(&self) -> usize {
        (self.max_lon as i64 - self.min_lon as i64 + 1).max(0) as usize
    }

    /// Number of tile rows (latitudes).
    pub fn rows(&self) -> usize {
        (self.max_lat as i64 - self.min_lat as i64 + 1).max(0) as usize
    }

    pub fn contains(&self, key: TileKey) -> bool {
        (self.min_lon..=self.max_lon).contains(&key.lon)
            && (self.min_lat..=self.max_lat).contains(&key.lat)
    }

    /// Position of `key` in lon-outer, lat-inner order, if inside.
    pub fn index_of(&self, key: TileKey) -> Option<usize> {
        if !self.contains(key) {
            return None;
        }
        let col = (key.lon - self.min_lon) as usize;
        let row = (key.lat - self.min_lat) as usize;
        Some(col * self.rows() + row)
    }

    /// Every key in lon-outer, lat-inner order.
    pub fn keys(&self) -> impl Iterator<Item = TileKey> {
        let (min_lat, max_lat) = (self.min_lat, self.max_lat);
        (self.min_lon..=self.max_lon)
            .flat_map(move |lon| (min_lat..=max_lat).map(move |lat| TileKey::new(lon, lat)))
    }
}

/// Tiles covering a circle of `radius_km` around `center`.
///
/// The circle is widened to its bounding box in degrees, so corner tiles that
/// the circle never touches are included too. Latitudes are clipped to the
/// globe and longitudes wrap across the antimeridian; a circle reaching a pole
/// or wider than the globe takes every longitude.
pub fn tiles_covering(center: GeoPoint, radius_km: f64) -> BTreeSet<TileKey> {
    let (d_lat, d_lon) = degree_deltas(center.lat, radius_km.max(0.0));

    let south = center.lat - d_lat;
    let north = center.lat + d_lat;
    let min_lat = (south.floor() as i32).clamp(MIN_TILE_LAT, MAX_TILE_LAT);
    let max_lat = (north.ceil() as i32).clamp(min_lat + 1, MAX_TILE_LAT + 1);

    let whole_ring = !d_lon.is_finite() || 2.0 * d_lon >= 360.0 || south <= -90.0 || north >= 90.0;
    let lons: Vec<i32> = if whole_ring {
        (MIN_TILE_LON..=MAX_TILE_LON).collect()
    } else {
        let min_lon = (center.lon - d_lon).floor() as i32;
        let max_lon = ((center.lon + d_lon).ceil() as i32).max(min_lon + 1);
        (min_lon..max_lon).map(wrap_tile_lon).collect()
    };

    lons.into_iter()
        .flat_map(|lon| (min_lat..max_lat).map(move |lat| TileKey::new(lon, lat)))
        .collect()
}

/// Wrap a tile longitude into -180..=179.
fn wrap_tile_lon(lon: i32) -> i32 {
    (lon + 180).rem_euclid(360) - 180
}
