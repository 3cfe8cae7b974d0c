//! Line-of-sight terrain masks.
//!
//! A [`TerrainMask`] records, for a fan of equally spaced bearings around a
//! sensor, the highest line-of-sight angle to any terrain sample along that
//! bearing. A target is visible when its own elevation angle from the sensor
//! clears the mask at its bearing.
//!
//! Terrain is sampled along straight planar rays using the same projection as
//! the area query, with each sample lowered by the Earth-curvature drop
//! `d²/(2R)`. Voids are treated as sea level.

use crate::error::{Result, TerrainError};
use crate::geo::{curvature_drop_m, normalize_azimuth, GeoPoint};
use crate::grid::NO_DATA_F64;
use crate::query::ElevationSource;

/// One terrain sample along a bearing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSample {
    /// Distance from the sensor in metres.
    pub distance_m: f64,
    /// Terrain elevation in metres, voids read as 0.
    pub elevation_m: f64,
    /// Line-of-sight angle to the curvature-corrected terrain, degrees.
    pub angle_deg: f64,
}

/// The mask along one bearing.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainProfile {
    pub azimuth_deg: f64,
    /// Highest line-of-sight angle along the bearing.
    pub mask_angle_deg: f64,
    samples: Vec<ProfileSample>,
}

impl TerrainProfile {
    fn new(azimuth_deg: f64, samples: Vec<ProfileSample>) -> Self {
        let mask_angle_deg = samples
            .iter()
            .map(|s| s.angle_deg)
            .fold(f64::NEG_INFINITY, f64::max);
        Self {
            azimuth_deg,
            mask_angle_deg,
            samples,
        }
    }

    /// Every terrain sample along the bearing, nearest first.
    pub fn samples(&self) -> &[ProfileSample] {
        &self.samples
    }

    /// The sample that set the mask angle, the nearest one on ties.
    pub fn obstruction(&self) -> ProfileSample {
        self.samples
            .iter()
            .copied()
            .reduce(|best, s| if s.angle_deg > best.angle_deg { s } else { best })
            .unwrap_or(ProfileSample {
                distance_m: 0.0,
                elevation_m: 0.0,
                angle_deg: self.mask_angle_deg,
            })
    }
}

/// Sample the terrain along one bearing at `num_samples` equal steps out to
/// `max_range_m`. The sensor position itself is not sampled.
pub fn sample_ray<S: ElevationSource + ?Sized>(
    source: &S,
    sensor: GeoPoint,
    sensor_alt_msl: f64,
    azimuth_deg: f64,
    max_range_m: f64,
    num_samples: usize,
) -> Vec<ProfileSample> {
    let step = max_range_m / num_samples as f64;
    (1..=num_samples)
        .map(|i| {
            let distance_m = i as f64 * step;
            let point = sensor.destination(azimuth_deg, distance_m);
            let raw = source.elevation_at(point.lat, point.lon);
            let elevation_m = if raw == NO_DATA_F64 { 0.0 } else { raw };
            let effective = elevation_m - curvature_drop_m(distance_m);
            ProfileSample {
                distance_m,
                elevation_m,
                angle_deg: (effective - sensor_alt_msl).atan2(distance_m).to_degrees(),
            }
        })
        .collect()
}

/// Compute the terrain mask around a sensor.
///
/// Bearings are `i · 360 / num_azimuths` degrees, clockwise from north.
///
/// # Errors
///
/// Returns [`TerrainError::InvalidParameter`] for a non-finite position or
/// altitude, a non-positive range, or zero azimuths or samples.
pub fn compute_mask<S: ElevationSource + ?Sized>(
    source: &S,
    sensor: GeoPoint,
    sensor_alt_msl: f64,
    max_range_m: f64,
    num_azimuths: usize,
    num_samples: usize,
) -> Result<TerrainMask> {
    validate(sensor, sensor_alt_msl, max_range_m, num_azimuths, num_samples)?;

    let step = 360.0 / num_azimuths as f64;
    let profiles = (0..num_azimuths)
        .map(|i| {
            let azimuth_deg = i as f64 * step;
            let samples = sample_ray(
                source,
                sensor,
                sensor_alt_msl,
                azimuth_deg,
                max_range_m,
                num_samples,
            );
            TerrainProfile::new(azimuth_deg, samples)
        })
        .collect();

    tracing::debug!(
        lat = sensor.lat,
        lon = sensor.lon,
        alt = sensor_alt_msl,
        max_range_m,
        num_azimuths,
        num_samples,
        "Computed terrain mask"
    );

    Ok(TerrainMask {
        sensor,
        sensor_alt_msl,
        max_range_m,
        num_samples,
        profiles,
    })
}

fn validate(
    sensor: GeoPoint,
    sensor_alt_msl: f64,
    max_range_m: f64,
    num_azimuths: usize,
    num_samples: usize,
) -> Result<()> {
    let invalid = |name: &'static str, reason: String| {
        Err(TerrainError::InvalidParameter { name, reason })
    };

    if !sensor.lat.is_finite() || sensor.lat.abs() >= 90.0 {
        return invalid("sensor", format!("latitude {} out of range", sensor.lat));
    }
    if !sensor.lon.is_finite() {
        return invalid("sensor", format!("longitude {} is not finite", sensor.lon));
    }
    if !sensor_alt_msl.is_finite() {
        return invalid("sensor_alt_msl", format!("{} is not finite", sensor_alt_msl));
    }
    if !max_range_m.is_finite() || max_range_m <= 0.0 {
        return invalid("max_range_m", format!("{} must be positive", max_range_m));
    }
    if num_azimuths == 0 {
        return invalid("num_azimuths", "must be at least 1".to_string());
    }
    if num_samples == 0 {
        return invalid("num_samples", "must be at least 1".to_string());
    }
    Ok(())
}

/// Mask angles around a sensor, one profile per bearing.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMask {
    sensor: GeoPoint,
    sensor_alt_msl: f64,
    max_range_m: f64,
    num_samples: usize,
    profiles: Vec<TerrainProfile>,
}

impl TerrainMask {
    pub fn sensor(&self) -> GeoPoint {
        self.sensor
    }

    pub fn sensor_alt_msl(&self) -> f64 {
        self.sensor_alt_msl
    }

    pub fn max_range_m(&self) -> f64 {
        self.max_range_m
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_azimuths(&self) -> usize {
        self.profiles.len()
    }

    /// Spacing between bearings in degrees.
    pub fn azimuth_step_deg(&self) -> f64 {
        360.0 / self.profiles.len() as f64
    }

    pub fn profiles(&self) -> &[TerrainProfile] {
        &self.profiles
    }

    /// Bearing of every profile in degrees, in order.
    pub fn azimuths(&self) -> Vec<f64> {
        self.profiles.iter().map(|p| p.azimuth_deg).collect()
    }

    /// Mask angle of every bearing, in bearing order.
    pub fn mask_angles(&self) -> Vec<f64> {
        self.profiles.iter().map(|p| p.mask_angle_deg).collect()
    }

    /// Mask angle at any bearing, linearly interpolated between the two
    /// neighbouring bearings. Bearings wrap at 360°.
    pub fn mask_angle_at(&self, azimuth_deg: f64) -> f64 {
        let n = self.profiles.len();
        let position = normalize_azimuth(azimuth_deg) / self.azimuth_step_deg();
        let lower = position.floor();
        let frac = position - lower;
        let i0 = (lower as usize) % n;
        let i1 = (i0 + 1) % n;
        let a0 = self.profiles[i0].mask_angle_deg;
        let a1 = self.profiles[i1].mask_angle_deg;
        a0 + (a1 - a0) * frac
    }

    /// Elevation angle of a target seen from the sensor, in degrees.
    ///
    /// Uses the planar distance and the target's own altitude; no curvature
    /// correction is applied to the target.
    pub fn elevation_angle_to(&self, target: GeoPoint, target_alt_msl: f64) -> f64 {
        let distance = self.sensor.planar_distance_m(&target);
        (target_alt_msl - self.sensor_alt_msl)
            .atan2(distance)
            .to_degrees()
    }

    /// How far the target's elevation angle clears (positive) or falls below
    /// (negative) the mask at its bearing, in degrees.
    pub fn obstruction_margin_deg(&self, target: GeoPoint, target_alt_msl: f64) -> f64 {
        let bearing = self.sensor.bearing_deg(&target);
        self.elevation_angle_to(target, target_alt_msl) - self.mask_angle_at(bearing)
    }

    /// Whether the target's elevation angle strictly exceeds the mask angle
    /// at its bearing.
    pub fn is_visible(&self, target: GeoPoint, target_alt_msl: f64) -> bool {
        self.obstruction_margin_deg(target, target_alt_msl) > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ElevationCache;
    use crate::coverage::TileKey;
    use crate::grid::ElevationGrid;

    struct Flat(f64);

    impl ElevationSource for Flat {
        fn elevation_at(&self, _lat: f64, _lon: f64) -> f64 {
            self.0
        }
    }

    /// A wall of `height` spanning a narrow band of distances along one
    /// bearing, flat sea level everywhere else.
    struct Spike {
        sensor: GeoPoint,
        azimuth_deg: f64,
        distance_m: f64,
        height: f64,
    }

    impl ElevationSource for Spike {
        fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
            let point = GeoPoint::new(lat, lon);
            let d = self.sensor.planar_distance_m(&point);
            let bearing = self.sensor.bearing_deg(&point);
            let off_bearing = (bearing - self.azimuth_deg).abs();
            if (d - self.distance_m).abs() < 60.0 && off_bearing < 0.5 {
                self.height
            } else {
                0.0
            }
        }
    }

    fn sensor() -> GeoPoint {
        GeoPoint::new(38.5, 27.5)
    }

    #[test]
    fn test_flat_terrain_mask_near_zero() {
        let mask = compute_mask(&Flat(120.0), sensor(), 120.0, 20_000.0, 36, 100).unwrap();
        assert_eq!(mask.num_azimuths(), 36);
        for profile in mask.profiles() {
            // Only the curvature drop pulls the angle below zero
            assert!(profile.mask_angle_deg <= 0.0);
            assert!(profile.mask_angle_deg > -0.01);
        }

        for az in [0.0, 45.0, 123.4, 359.9] {
            let near = sensor().destination(az, 5_000.0);
            let far = sensor().destination(az, 19_000.0);
            assert!(mask.is_visible(near, 120.0));
            assert!(mask.is_visible(far, 120.0));
            assert!(mask.is_visible(far, 500.0));
        }
    }

    #[test]
    fn test_single_spike() {
        let spike = Spike {
            sensor: sensor(),
            azimuth_deg: 90.0,
            distance_m: 5_000.0,
            height: 500.0,
        };
        let mask = compute_mask(&spike, sensor(), 0.0, 10_000.0, 360, 100).unwrap();

        let expected = 500.0f64.atan2(5_000.0).to_degrees();
        let at_spike = mask.mask_angle_at(90.0);
        assert!((at_spike - expected).abs() < 0.05, "{} vs {}", at_spike, expected);

        let obstruction = mask.profiles()[90].obstruction();
        assert!((obstruction.distance_m - 5_000.0).abs() < 1e-6);
        assert_eq!(obstruction.elevation_m, 500.0);

        // Other bearings see only sea level
        assert!(mask.mask_angle_at(270.0) <= 0.0);

        // Lower target behind the spike on the same bearing
        let behind = sensor().destination(90.0, 8_000.0);
        assert!(!mask.is_visible(behind, 200.0));
        assert!(mask.obstruction_margin_deg(behind, 200.0) < 0.0);
        // High enough to clear it
        assert!(mask.is_visible(behind, 1_500.0));
        // The same low target on the opposite bearing is clear
        let opposite = sensor().destination(270.0, 8_000.0);
        assert!(mask.is_visible(opposite, 200.0));
    }

    #[test]
    fn test_mask_angle_interpolates_cyclically() {
        let profile = |azimuth_deg: f64, angle: f64| {
            TerrainProfile::new(
                azimuth_deg,
                vec![ProfileSample {
                    distance_m: 1.0,
                    elevation_m: 0.0,
                    angle_deg: angle,
                }],
            )
        };
        let mask = TerrainMask {
            sensor: sensor(),
            sensor_alt_msl: 0.0,
            max_range_m: 1_000.0,
            num_samples: 1,
            profiles: vec![
                profile(0.0, 4.0),
                profile(90.0, 0.0),
                profile(180.0, 2.0),
                profile(270.0, 8.0),
            ],
        };

        assert_eq!(mask.mask_angle_at(0.0), 4.0);
        assert_eq!(mask.mask_angle_at(45.0), 2.0);
        assert_eq!(mask.mask_angle_at(135.0), 1.0);
        // Between the last bearing and north
        assert_eq!(mask.mask_angle_at(315.0), 6.0);
        assert_eq!(mask.mask_angle_at(-45.0), 6.0);
        assert_eq!(mask.mask_angle_at(405.0), 2.0);
        assert_eq!(mask.mask_angles(), vec![4.0, 0.0, 2.0, 8.0]);
        assert_eq!(mask.azimuths(), vec![0.0, 90.0, 180.0, 270.0]);
    }

    #[test]
    fn test_profiles_keep_every_sample() {
        let spike = Spike {
            sensor: sensor(),
            azimuth_deg: 90.0,
            distance_m: 3_000.0,
            height: 300.0,
        };
        let mask = compute_mask(&spike, sensor(), 10.0, 6_000.0, 4, 50).unwrap();
        assert_eq!(mask.azimuths(), vec![0.0, 90.0, 180.0, 270.0]);

        for profile in mask.profiles() {
            let samples = profile.samples();
            assert_eq!(samples.len(), 50);
            assert!(samples.windows(2).all(|w| w[0].distance_m < w[1].distance_m));
            assert!((samples[49].distance_m - 6_000.0).abs() < 1e-6);

            let highest = samples.iter().map(|s| s.angle_deg).fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(profile.mask_angle_deg, highest);
            assert_eq!(profile.obstruction().angle_deg, highest);
        }
        assert_eq!(mask.profiles()[1].obstruction().elevation_m, 300.0);
    }

    #[test]
    fn test_voids_read_as_sea_level() {
        let cache = ElevationCache::from_tiles(
            3,
            [(TileKey::new(27, 38), ElevationGrid::filled(3, crate::grid::NO_DATA).unwrap())],
        )
        .unwrap();
        let samples = sample_ray(&cache, sensor(), 10.0, 0.0, 1_000.0, 4);
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|s| s.elevation_m == 0.0));
        assert!((samples[0].distance_m - 250.0).abs() < 1e-9);
        assert!(samples.iter().all(|s| s.angle_deg < 0.0));
    }

    #[test]
    fn test_unloaded_terrain_everything_visible_above_sea_level() {
        // No tiles anywhere near the sensor
        let cache = ElevationCache::from_tiles(
            2,
            [(TileKey::new(-100, -50), ElevationGrid::filled(2, 9000).unwrap())],
        )
        .unwrap();
        let mask = compute_mask(&cache, sensor(), 50.0, 5_000.0, 8, 10).unwrap();
        assert!(mask.is_visible(sensor().destination(10.0, 3_000.0), 50.0));
    }

    #[test]
    fn test_invalid_parameters() {
        let flat = Flat(0.0);
        let cases = [
            compute_mask(&flat, sensor(), 0.0, 0.0, 360, 10),
            compute_mask(&flat, sensor(), 0.0, f64::NAN, 360, 10),
            compute_mask(&flat, sensor(), 0.0, 1_000.0, 0, 10),
            compute_mask(&flat, sensor(), 0.0, 1_000.0, 360, 0),
            compute_mask(&flat, sensor(), f64::INFINITY, 1_000.0, 360, 10),
            compute_mask(&flat, GeoPoint::new(90.0, 0.0), 0.0, 1_000.0, 360, 10),
            compute_mask(&flat, GeoPoint::new(0.0, f64::NAN), 0.0, 1_000.0, 360, 10),
        ];
        for result in cases {
            assert!(matches!(result, Err(TerrainError::InvalidParameter { .. })));
        }
    }
}
