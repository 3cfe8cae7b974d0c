//! Compute a terrain mask around a sensor and test a few targets.
//!
//! Run with: cargo run --example line_of_sight -- /path/to/cache.dtc <lat> <lon> <alt_msl>

use std::env;

use terramask::{GeoPoint, TerrainEngine, TerrainError};

fn main() -> Result<(), TerrainError> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 5 {
        eprintln!("Usage: cargo run --example line_of_sight -- /path/to/cache.dtc <lat> <lon> <alt_msl>");
        std::process::exit(1);
    }

    let parse = |s: &str| -> f64 {
        s.parse().unwrap_or_else(|_| {
            eprintln!("Not a number: {}", s);
            std::process::exit(1);
        })
    };
    let sensor = GeoPoint::new(parse(&args[2]), parse(&args[3]));
    let sensor_alt = parse(&args[4]);

    let engine = TerrainEngine::new();
    engine.try_load_cache(&args[1])?;

    let mask = engine.mask(sensor, sensor_alt, 30_000.0, 36, 300)?;

    println!("Mask around ({}, {}) at {}m MSL:", sensor.lat, sensor.lon, sensor_alt);
    println!("{:-<50}", "");
    for profile in mask.profiles() {
        let obstruction = profile.obstruction();
        println!(
            "{:>5.0}°  {:>6.2}°  (terrain {:.0}m at {:.1}km)",
            profile.azimuth_deg,
            profile.mask_angle_deg,
            obstruction.elevation_m,
            obstruction.distance_m / 1000.0
        );
    }

    // A low drone 10 km out on each quadrant
    println!("\nTargets at 10 km, 150 m above the sensor:");
    for azimuth in [0.0, 90.0, 180.0, 270.0] {
        let target = sensor.destination(azimuth, 10_000.0);
        let margin = mask.obstruction_margin_deg(target, sensor_alt + 150.0);
        println!(
            "{:>5.0}°: {} (margin {:+.2}°)",
            azimuth,
            if margin > 0.0 { "visible" } else { "masked" },
            margin
        );
    }

    Ok(())
}
