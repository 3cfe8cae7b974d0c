use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use terramask::{GeoPoint, TerrainMask};

use super::load_engine;

/// Sensor placement and sampling shared by `mask` and `batch`.
pub struct MaskArgs {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub range_m: f64,
    pub azimuths: usize,
    pub samples: usize,
}

impl MaskArgs {
    pub fn sensor(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

#[derive(Serialize)]
struct ProfileResponse {
    azimuth_deg: f64,
    mask_angle_deg: f64,
    obstruction_distance_m: f64,
    obstruction_elevation_m: f64,
}

#[derive(Serialize)]
struct MaskResponse {
    lat: f64,
    lon: f64,
    alt: f64,
    max_range_m: f64,
    num_samples: usize,
    azimuth_step_deg: f64,
    profiles: Vec<ProfileResponse>,
}

impl From<&TerrainMask> for MaskResponse {
    fn from(mask: &TerrainMask) -> Self {
        let sensor = mask.sensor();
        Self {
            lat: sensor.lat,
            lon: sensor.lon,
            alt: mask.sensor_alt_msl(),
            max_range_m: mask.max_range_m(),
            num_samples: mask.num_samples(),
            azimuth_step_deg: mask.azimuth_step_deg(),
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

pub fn run(
    cache_file: Option<PathBuf>,
    hgt_dir: Option<PathBuf>,
    args: MaskArgs,
    json: bool,
) -> Result<()> {
    let engine = load_engine(cache_file, hgt_dir)?;
    let mask = engine
        .compute_mask(
            args.sensor(),
            args.alt,
            args.range_m,
            args.azimuths,
            args.samples,
        )
        .context("Failed to compute terrain mask")?;

    if json {
        println!("{}", serde_json::to_string(&MaskResponse::from(&mask))?);
        return Ok(());
    }

    println!(
        "Sensor: {:.6}, {:.6} at {:.1}m MSL, range {:.0}m",
        args.lat, args.lon, args.alt, args.range_m
    );
    println!();
    println!(
        "{:>9} {:>10} {:>14} {:>12}",
        "AZIMUTH", "MASK(deg)", "OBSTRUCTION(m)", "TERRAIN(m)"
    );
    println!("{}", "-".repeat(48));
    for profile in mask.profiles() {
        let obstruction = profile.obstruction();
        println!(
            "{:>9.2} {:>10.3} {:>14.0} {:>12.1}",
            profile.azimuth_deg,
            profile.mask_angle_deg,
            obstruction.distance_m,
            obstruction.elevation_m
        );
    }

    let angles = mask.mask_angles();
    let highest = angles.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let lowest = angles.iter().cloned().fold(f64::INFINITY, f64::min);
    println!("{}", "-".repeat(48));
    println!("Mask angle range: {:.3} to {:.3} deg", lowest, highest);

    Ok(())
}
