use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use terramask::download::{DownloadConfig, Downloader, TileOutcome};
use terramask::filename::coords_to_filename;
use terramask::{tiles_covering, GeoPoint};

use super::progress_bar;

pub fn run(
    lat: f64,
    lon: f64,
    radius_km: f64,
    dest: PathBuf,
    url: Option<String>,
    ardupilot: bool,
    timeout: u64,
) -> Result<()> {
    if !radius_km.is_finite() || radius_km <= 0.0 {
        bail!("--radius-km must be positive");
    }

    let config = match url {
        Some(template) => DownloadConfig::with_url_template(template),
        None if ardupilot => DownloadConfig::ardupilot_srtm1(),
        None => DownloadConfig::aws_skadi(),
    }
    .with_timeout(timeout);

    let downloader = Downloader::new(config).context("Failed to create HTTP client")?;
    let tiles = tiles_covering(GeoPoint::new(lat, lon), radius_km);

    let pb = progress_bar(tiles.len() as u64)?;
    let report = downloader
        .ensure_tiles(tiles, &dest, |p| {
            if p.outcome == TileOutcome::Failed {
                pb.println(format!("Failed: {}", coords_to_filename(p.key.lat, p.key.lon)));
            }
            pb.set_position(p.done as u64);
        })
        .with_context(|| format!("Failed to prepare {}", dest.display()))?;
    pb.finish_with_message("done");

    println!("Destination: {}", dest.display());
    println!("Downloaded:  {}", report.downloaded);
    println!("Present:     {}", report.skipped);
    println!("Failed:      {}", report.failed);

    if report.failed > 0 {
        let names: Vec<String> = report
            .failed_tiles
            .iter()
            .map(|k| coords_to_filename(k.lat, k.lon))
            .collect();
        println!("Failed tiles: {}", names.join(", "));
    }

    Ok(())
}
