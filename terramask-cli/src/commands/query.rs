use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use terramask::NO_DATA_F64;

use super::load_engine;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: Option<f64>,
}

pub fn run(
    cache_file: Option<PathBuf>,
    hgt_dir: Option<PathBuf>,
    lat: f64,
    lon: f64,
    json: bool,
) -> Result<()> {
    let engine = load_engine(cache_file, hgt_dir)?;

    let raw = engine.elevation_at(lat, lon);
    let elevation = (raw != NO_DATA_F64).then_some(raw);

    if json {
        let response = ElevationResponse {
            lat,
            lon,
            elevation,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        match elevation {
            Some(elev) => println!("{:.2}", elev),
            None => println!("void"),
        }
    }

    Ok(())
}
