//! Basic example demonstrating terramask library usage.
//!
//! Run with: cargo run --example basic -- /path/to/cache.dtc

use std::env;

use terramask::{ElevationCache, TerrainError, NO_DATA_F64};

fn main() -> Result<(), TerrainError> {
    // Get the cache file from command line
    let cache_file = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/cache.dtc");
        std::process::exit(1);
    });

    let cache = ElevationCache::load(&cache_file)?;
    let bounds = cache.bounds();
    println!(
        "Loaded {} tiles ({} posts) covering lon {}..={} lat {}..={}",
        cache.present_count(),
        cache.tile_posts(),
        bounds.min_lon,
        bounds.max_lon,
        bounds.min_lat,
        bounds.max_lat
    );

    // Query a few points, whether or not they're covered
    let locations = [
        ("Izmir, Turkey", 38.4237, 27.1428),
        ("Mount Olympus, Greece", 40.0859, 22.3583),
        ("Mount Etna, Italy", 37.7510, 14.9934),
    ];

    println!("\nElevation queries (bilinear):");
    println!("{:-<50}", "");

    for (name, lat, lon) in &locations {
        let elevation = cache.elevation_at(*lat, *lon);
        if elevation == NO_DATA_F64 {
            println!("{}: no data", name);
        } else {
            println!("{}: {:.1}m", name, elevation);
        }
    }

    Ok(())
}
