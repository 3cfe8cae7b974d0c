use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use terramask::cache::{self, MAGIC_V1, MAGIC_V2};
use terramask::filename::{dted_path_to_lat_lon, filename_to_lat_lon};
use terramask::tile::read_tile;
use terramask::ElevationCache;

use super::{coverage_label, format_size};

pub fn run(path: PathBuf) -> Result<()> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }

    let file_size = std::fs::metadata(&path)?.len();
    if is_cache_file(&path)? {
        cache_info(&path, file_size)
    } else {
        tile_info(&path, file_size)
    }
}

fn is_cache_file(path: &Path) -> Result<bool> {
    let mut magic = [0u8; 8];
    let mut file = File::open(path).context("Failed to open file")?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == MAGIC_V1 || &magic == MAGIC_V2),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn cache_info(path: &Path, file_size: u64) -> Result<()> {
    let header = cache::read_header(path).context("Failed to read cache header")?;
    let cache = ElevationCache::load(path).context("Failed to load cache")?;
    let bounds = header.bounds;

    println!("Cache: {}", path.display());
    println!();
    println!("Version: {:?}", header.version);
    println!("Tile posts: {}x{}", header.tile_posts, header.tile_posts);
    println!(
        "Coverage: lon {}..={}, lat {}..={}",
        bounds.min_lon, bounds.max_lon, bounds.min_lat, bounds.max_lat
    );
    println!(
        "Tiles present: {} of {}",
        cache.present_count(),
        header.cell_count()
    );
    println!("File size: {}", format_size(file_size));

    let range = cache
        .present_tiles()
        .filter_map(|(_, grid)| grid.elevation_range())
        .reduce(|(lo, hi), (min, max)| (lo.min(min), hi.max(max)));
    if let Some((min, max)) = range {
        println!();
        println!("Min elevation: {}m", min);
        println!("Max elevation: {}m", max);
    }

    Ok(())
}

fn tile_info(path: &Path, file_size: u64) -> Result<()> {
    let (format, grid) = read_tile(path).context("Failed to load tile")?;

    let origin = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(filename_to_lat_lon)
        .or_else(|| dted_path_to_lat_lon(path));

    let posts = format.posts();
    println!("Tile: {}", path.display());
    println!();
    println!("Format: {} ({}x{} posts)", format, posts, posts);
    if let Some((lat, lon)) = origin {
        println!("Coverage: {}", coverage_label(lat, lon));
    }
    println!("File size: {}", format_size(file_size));
    println!();

    if let Some((min, max)) = grid.elevation_range() {
        println!("Min elevation: {}m", min);
        println!("Max elevation: {}m", max);
    }

    let void_count = grid.void_count();
    if void_count > 0 {
        let total = (posts * posts) as f64;
        let void_pct = void_count as f64 / total * 100.0;
        println!("Void samples: {} ({:.1}%)", void_count, void_pct);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use terramask::{ElevationGrid, TileKey};

    #[test]
    fn test_detects_cache_by_magic() {
        let tmp = TempDir::new().unwrap();
        let cache_path = tmp.path().join("area.dtc");
        ElevationCache::from_tiles(121, [(TileKey::new(27, 38), ElevationGrid::filled(121, 7).unwrap())])
            .unwrap()
            .save(&cache_path)
            .unwrap();
        assert!(is_cache_file(&cache_path).unwrap());

        let short = tmp.path().join("N00E000.hgt");
        fs::write(&short, b"abc").unwrap();
        assert!(!is_cache_file(&short).unwrap());
    }
}
