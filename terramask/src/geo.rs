//! Planar geometry helpers shared by the area query and the mask calculator.
//!
//! All distances use the same local equirectangular approximation: one degree
//! of latitude is [`KM_PER_DEGREE`] kilometres and one degree of longitude is
//! that value scaled by the cosine of the reference latitude.

/// Kilometres per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Metres per degree of latitude.
pub const M_PER_DEGREE: f64 = KM_PER_DEGREE * 1000.0;

/// Mean Earth radius in metres, used for the curvature correction.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Planar distance to `other` in metres, scaling longitude by the cosine
    /// of this point's latitude.
    pub fn planar_distance_m(&self, other: &GeoPoint) -> f64 {
        let d_lat = other.lat - self.lat;
        let d_lon = (other.lon - self.lon) * self.lat.to_radians().cos();
        (d_lat * d_lat + d_lon * d_lon).sqrt() * M_PER_DEGREE
    }

    /// Bearing to `other` in degrees, 0 = north, clockwise, in `[0, 360)`.
    pub fn bearing_deg(&self, other: &GeoPoint) -> f64 {
        let d_lat = other.lat - self.lat;
        let d_lon = (other.lon - self.lon) * self.lat.to_radians().cos();
        normalize_azimuth(d_lon.atan2(d_lat).to_degrees())
    }

    /// Point reached by travelling `distance_m` along `azimuth_deg`.
    pub fn destination(&self, azimuth_deg: f64, distance_m: f64) -> GeoPoint {
        let az = azimuth_deg.to_radians();
        let d_deg = distance_m / M_PER_DEGREE;
        GeoPoint {
            lat: self.lat + d_deg * az.cos(),
            lon: self.lon + d_deg * az.sin() / self.lat.to_radians().cos(),
        }
    }
}

/// Wrap an azimuth into `[0, 360)`.
pub fn normalize_azimuth(azimuth_deg: f64) -> f64 {
    let wrapped = azimuth_deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Latitude and longitude half-extents in degrees of a circle of `radius_km`
/// centred at `center_lat`.
pub fn degree_deltas(center_lat: f64, radius_km: f64) -> (f64, f64) {
    let d_lat = radius_km / KM_PER_DEGREE;
    let d_lon = radius_km / (KM_PER_DEGREE * center_lat.to_radians().cos());
    (d_lat, d_lon)
}

/// Height the terrain drops below the local horizontal plane at `distance_m`.
pub fn curvature_drop_m(distance_m: f64) -> f64 {
    distance_m * distance_m / (2.0 * EARTH_RADIUS_M)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(38.0, 27.0);
        assert!((origin.bearing_deg(&GeoPoint::new(38.1, 27.0)) - 0.0).abs() < 1e-9);
        assert!((origin.bearing_deg(&GeoPoint::new(38.0, 27.1)) - 90.0).abs() < 1e-9);
        assert!((origin.bearing_deg(&GeoPoint::new(37.9, 27.0)) - 180.0).abs() < 1e-9);
        assert!((origin.bearing_deg(&GeoPoint::new(38.0, 26.9)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_destination_roundtrip() {
        let origin = GeoPoint::new(38.0, 27.0);
        for azimuth in [0.0, 45.0, 135.0, 210.0, 300.0] {
            let target = origin.destination(azimuth, 25_000.0);
            assert!((origin.planar_distance_m(&target) - 25_000.0).abs() < 1e-6);
            assert!((origin.bearing_deg(&target) - azimuth).abs() < 1e-9);
        }
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = GeoPoint::new(10.0, 5.0);
        let b = GeoPoint::new(11.0, 5.0);
        assert!((a.planar_distance_m(&b) - 111_320.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_azimuth() {
        assert_eq!(normalize_azimuth(0.0), 0.0);
        assert_eq!(normalize_azimuth(360.0), 0.0);
        assert_eq!(normalize_azimuth(-90.0), 270.0);
        assert_eq!(normalize_azimuth(725.0), 5.0);
    }

    #[test]
    fn test_degree_deltas_widen_with_latitude() {
        let (d_lat, d_lon_equator) = degree_deltas(0.0, 111.32);
        assert!((d_lat - 1.0).abs() < 1e-12);
        assert!((d_lon_equator - 1.0).abs() < 1e-12);

        let (_, d_lon_60) = degree_deltas(60.0, 111.32);
        assert!((d_lon_60 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_curvature_drop() {
        assert_eq!(curvature_drop_m(0.0), 0.0);
        // ~7.8 m at 10 km
        let drop = curvature_drop_m(10_000.0);
        assert!((drop - 7.848).abs() < 0.01);
    }
}
