use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use terramask::cache::discover_tiles;
use terramask::filename::coords_to_filename;

use super::{coverage_label, format_size};

pub fn run(dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => bail!("No directory given. Pass one or use --hgt-dir / TERRAMASK_HGT_DIR"),
    };

    if !dir.exists() {
        bail!("Directory does not exist: {}", dir.display());
    }

    let tiles = discover_tiles(&dir).context("Failed to read source directory")?;
    if tiles.is_empty() {
        println!("No DTED or .hgt tiles found in: {}", dir.display());
        return Ok(());
    }

    println!("{:<10} {:>16} {:>22}", "TILE", "FORMAT", "COVERAGE");
    println!("{}", "-".repeat(50));

    let mut total_size: u64 = 0;
    for tile in &tiles {
        let size = fs::metadata(&tile.path).map(|m| m.len()).unwrap_or(0);
        total_size += size;

        let name = coords_to_filename(tile.key.lat, tile.key.lon);
        let name = name.trim_end_matches(".hgt");
        println!(
            "{:<10} {:>16} {:>22}",
            name,
            tile.format.to_string(),
            coverage_label(tile.key.lat, tile.key.lon)
        );
    }

    println!("{}", "-".repeat(50));
    println!("Total: {} tiles ({})", tiles.len(), format_size(total_size));

    let mut formats: Vec<_> = tiles.iter().map(|t| t.format).collect();
    formats.sort_by_key(|f| std::cmp::Reverse(f.preference()));
    formats.dedup();
    if formats.len() > 1 {
        println!("Mixed formats: a cache build uses {} only", formats[0]);
    }

    Ok(())
}
