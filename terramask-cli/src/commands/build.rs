use anyhow::{Context, Result};
use std::path::PathBuf;
use terramask::cache;

use super::{format_size, progress_bar};

pub fn run(source: PathBuf, output: PathBuf) -> Result<()> {
    if !source.is_dir() {
        anyhow::bail!("Source directory does not exist: {}", source.display());
    }

    let pb = progress_bar(0)?;
    let report = cache::build_with_progress(&source, &output, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    })
    .with_context(|| format!("Failed to build cache from {}", source.display()))?;
    pb.finish_with_message("done");

    let bounds = report.bounds;
    println!("Cache: {}", output.display());
    println!("Format: {} ({} posts)", report.format, report.format.posts());
    println!(
        "Coverage: lon {}..={}, lat {}..={} ({}x{} tiles)",
        bounds.min_lon,
        bounds.max_lon,
        bounds.min_lat,
        bounds.max_lat,
        bounds.cols(),
        bounds.rows()
    );
    println!("Tiles written: {}", report.tiles_written);
    if report.tiles_ignored > 0 {
        println!(
            "Tiles ignored: {} (lower resolution or other format)",
            report.tiles_ignored
        );
    }
    println!("File size: {}", format_size(report.bytes));

    Ok(())
}
