use anyhow::{Context, Result};
use csv::StringRecord;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use terramask::{GeoPoint, TerrainMask};

use super::mask::MaskArgs;
use super::{load_engine, progress_bar};

/// Names of the target columns in the input CSV.
pub struct Columns {
    pub lat: String,
    pub lon: String,
    pub alt: String,
}

pub fn run(
    cache_file: Option<PathBuf>,
    hgt_dir: Option<PathBuf>,
    sensor: MaskArgs,
    input: PathBuf,
    output: Option<PathBuf>,
    columns: Columns,
) -> Result<()> {
    let engine = load_engine(cache_file, hgt_dir)?;
    let mask = engine
        .compute_mask(
            sensor.sensor(),
            sensor.alt,
            sensor.range_m,
            sensor.azimuths,
            sensor.samples,
        )
        .context("Failed to compute terrain mask")?;

    let output_path = output.unwrap_or_else(|| default_output(&input));
    let written = process_csv(&mask, &input, &output_path, &columns)?;

    println!("{} targets written to: {}", written, output_path.display());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "targets".to_string());
    input.with_file_name(format!("{}_visibility.csv", stem))
}

fn process_csv(
    mask: &TerrainMask,
    input: &Path,
    output: &Path,
    columns: &Columns,
) -> Result<usize> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("Column '{}' not found in CSV", name))
    };
    let lat_idx = column(&columns.lat)?;
    let lon_idx = column(&columns.lon)?;
    let alt_idx = column(&columns.alt)?;

    // Collect records for progress bar
    let records: Vec<StringRecord> = reader.records().collect::<Result<_, _>>()?;
    let pb = progress_bar(records.len() as u64)?;

    let output_file = File::create(output).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("visible");
    new_headers.push("margin_deg");
    writer.write_record(&new_headers)?;

    for (line, record) in records.iter().enumerate() {
        let field = |idx: usize, what: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("Missing {} on row {}", what, line + 1))?
                .trim()
                .parse()
                .with_context(|| format!("Invalid {} on row {}", what, line + 1))
        };
        let target = GeoPoint::new(field(lat_idx, "latitude")?, field(lon_idx, "longitude")?);
        let alt = field(alt_idx, "altitude")?;

        let margin = mask.obstruction_margin_deg(target, alt);
        let visible = (margin > 0.0).to_string();
        let margin = format!("{:.4}", margin);

        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&visible);
        new_record.push(&margin);
        writer.write_record(&new_record)?;

        pb.inc(1);
    }

    pb.finish_with_message("done");
    writer.flush()?;

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use terramask::{compute_mask, ElevationCache, ElevationGrid, TileKey};

    fn flat_mask() -> TerrainMask {
        let cache = ElevationCache::from_tiles(
            121,
            [(TileKey::new(27, 38), ElevationGrid::filled(121, 0).unwrap())],
        )
        .unwrap();
        compute_mask(&cache, GeoPoint::new(38.5, 27.5), 10.0, 10_000.0, 36, 50).unwrap()
    }

    fn columns() -> Columns {
        Columns {
            lat: "lat".to_string(),
            lon: "lon".to_string(),
            alt: "alt".to_string(),
        }
    }

    #[test]
    fn test_appends_visibility_columns() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("targets.csv");
        let output = tmp.path().join("out.csv");
        fs::write(
            &input,
            "name,lat,lon,alt\nhigh,38.55,27.5,500\nlow,38.55,27.5,-500\n",
        )
        .unwrap();

        let written = process_csv(&flat_mask(), &input, &output, &columns()).unwrap();
        assert_eq!(written, 2);

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            ["name", "lat", "lon", "alt", "visible", "margin_deg"]
        );
        let rows: Vec<StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[0][0], "high");
        assert_eq!(&rows[0][4], "true");
        assert_eq!(&rows[1][4], "false");
    }

    #[test]
    fn test_missing_column_is_reported() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("targets.csv");
        fs::write(&input, "lat,lon\n38.5,27.5\n").unwrap();

        let err = process_csv(&flat_mask(), &input, &tmp.path().join("o.csv"), &columns())
            .unwrap_err();
        assert!(err.to_string().contains("Column 'alt' not found"));
    }

    #[test]
    fn test_default_output_name() {
        assert_eq!(
            default_output(Path::new("/data/targets.csv")),
            PathBuf::from("/data/targets_visibility.csv")
        );
    }
}
