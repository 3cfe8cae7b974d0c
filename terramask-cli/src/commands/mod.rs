use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use terramask::{TerrainEngine, TerrainEngineBuilder};

pub mod batch;
pub mod build;
pub mod fetch;
pub mod info;
pub mod list;
pub mod mask;
pub mod query;

/// Build an engine from the global `--cache-file` / `--hgt-dir` options.
pub fn load_engine(cache_file: Option<PathBuf>, hgt_dir: Option<PathBuf>) -> Result<TerrainEngine> {
    if cache_file.is_none() && hgt_dir.is_none() {
        bail!(
            "No terrain configured. Use --cache-file / --hgt-dir or set TERRAMASK_CACHE_FILE / TERRAMASK_HGT_DIR"
        );
    }

    let mut builder = TerrainEngineBuilder::new();
    if let Some(dir) = hgt_dir {
        if !dir.is_dir() {
            bail!("HGT directory does not exist: {}", dir.display());
        }
        builder = builder.hgt_dir(dir);
    }
    let engine = builder.build();

    if let Some(path) = cache_file {
        engine
            .try_load_cache(&path)
            .with_context(|| format!("Failed to load cache file {}", path.display()))?;
    }

    Ok(engine)
}

pub fn progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// "N38-N39, E027-E028" style coverage label for a 1° tile.
pub fn coverage_label(lat: i32, lon: i32) -> String {
    let ns = |v: i32| if v >= 0 { 'N' } else { 'S' };
    let ew = |v: i32| if v >= 0 { 'E' } else { 'W' };
    format!(
        "{}{:02}-{}{:02}, {}{:03}-{}{:03}",
        ns(lat),
        lat.abs(),
        ns(lat + 1),
        (lat + 1).abs(),
        ew(lon),
        lon.abs(),
        ew(lon + 1),
        (lon + 1).abs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(2_884_802), "2.75 MB");
    }

    #[test]
    fn test_coverage_label() {
        assert_eq!(coverage_label(38, 27), "N38-N39, E027-E028");
        assert_eq!(coverage_label(-1, -1), "S01-N00, W001-E000");
    }

    #[test]
    fn test_load_engine_requires_terrain() {
        assert!(load_engine(None, None).is_err());
    }

    #[test]
    fn test_load_engine_reports_missing_cache() {
        let err = load_engine(Some(PathBuf::from("/nonexistent/terrain.dtc")), None).unwrap_err();
        assert!(err.to_string().contains("Failed to load cache file"));
    }
}
