//! Tile filename utilities.
//!
//! This module converts between integer tile coordinates and the two naming
//! schemes found on disk.
//!
//! # Filename Formats
//!
//! Flat SRTM files follow `{N|S}{lat}{E|W}{lon}.hgt`:
//!
//! - Latitude: 2 digits with N/S prefix (e.g., N35, S12)
//! - Longitude: 3 digits with E/W prefix (e.g., E138, W077)
//!
//! DTED trees use one directory per longitude and one file per latitude,
//! lower-case: `{e|w}{lon}/{n|s}{lat}.dt{level}` (e.g., `e027/n38.dt2`).
//!
//! Both name the **southwest corner** of the 1° × 1° tile.

use std::path::{Path, PathBuf};

use crate::tile::TileFormat;

/// Convert latitude and longitude to an SRTM `.hgt` filename.
///
/// # Examples
///
/// ```
/// use terramask::filename::lat_lon_to_filename;
///
/// assert_eq!(lat_lon_to_filename(35.5, 138.7), "N35E138.hgt");
/// assert_eq!(lat_lon_to_filename(-12.3, -77.1), "S13W078.hgt");
/// assert_eq!(lat_lon_to_filename(0.5, -0.5), "N00W001.hgt");
/// ```
pub fn lat_lon_to_filename(lat: f64, lon: f64) -> String {
    coords_to_filename(lat.floor() as i32, lon.floor() as i32)
}

/// SRTM `.hgt` filename of the tile whose southwest corner is `(lat, lon)`.
pub fn coords_to_filename(lat: i32, lon: i32) -> String {
    let lat_prefix = if lat >= 0 { 'N' } else { 'S' };
    let lon_prefix = if lon >= 0 { 'E' } else { 'W' };

    format!(
        "{}{:02}{}{:03}.hgt",
        lat_prefix,
        lat.abs(),
        lon_prefix,
        lon.abs()
    )
}

/// Latitude band directory used by remote tile stores (e.g. `N38`, `S05`).
pub fn lat_band(lat: i32) -> String {
    format!("{}{:02}", if lat >= 0 { 'N' } else { 'S' }, lat.abs())
}

/// Parse an SRTM filename to extract the base coordinates.
///
/// Returns the (latitude, longitude) of the southwest corner, or `None` if
/// parsing fails.
///
/// # Examples
///
/// ```
/// use terramask::filename::filename_to_lat_lon;
///
/// assert_eq!(filename_to_lat_lon("N35E138.hgt"), Some((35, 138)));
/// assert_eq!(filename_to_lat_lon("S12W077.hgt"), Some((-12, -77)));
/// assert_eq!(filename_to_lat_lon("/path/to/N00E000.hgt"), Some((0, 0)));
/// assert_eq!(filename_to_lat_lon("invalid"), None);
/// ```
pub fn filename_to_lat_lon(filename: &str) -> Option<(i32, i32)> {
    // Extract just the filename if a path is given
    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit('\\')
        .next()
        .unwrap_or(filename);

    let name = name
        .strip_suffix(".hgt")
        .or_else(|| name.strip_suffix(".HGT"))
        .unwrap_or(name);

    // Must be exactly 7 characters: N00E000
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }

    let lat = parse_signed(&name[0..3], 'N', 'S')?;
    let lon = parse_signed(&name[3..7], 'E', 'W')?;
    Some((lat, lon))
}

/// Relative path of a DTED tile inside a source tree.
///
/// # Examples
///
/// ```
/// use terramask::filename::dted_path;
/// use terramask::TileFormat;
///
/// assert_eq!(
///     dted_path(38, 27, TileFormat::Dted2),
///     std::path::PathBuf::from("e027").join("n38.dt2")
/// );
/// ```
pub fn dted_path(lat: i32, lon: i32, format: TileFormat) -> PathBuf {
    let lon_dir = format!("{}{:03}", if lon >= 0 { 'e' } else { 'w' }, lon.abs());
    let lat_file = format!(
        "{}{:02}.{}",
        if lat >= 0 { 'n' } else { 's' },
        lat.abs(),
        format.extension()
    );
    PathBuf::from(lon_dir).join(lat_file)
}

/// Parse `…/{e|w}{lon}/{n|s}{lat}.dtN` into `(lat, lon)`.
///
/// Case-insensitive; returns `None` for anything that doesn't follow the
/// DTED directory convention.
pub fn dted_path_to_lat_lon(path: &Path) -> Option<(i32, i32)> {
    let stem = path.file_stem()?.to_str()?;
    let lon_dir = path.parent()?.file_name()?.to_str()?;

    if stem.len() != 3 || lon_dir.len() != 4 || !stem.is_ascii() || !lon_dir.is_ascii() {
        return None;
    }

    let lat = parse_signed(stem, 'N', 'S')?;
    let lon = parse_signed(lon_dir, 'E', 'W')?;
    Some((lat, lon))
}

/// Parse a hemisphere letter followed by digits, e.g. `N35` or `w077`.
fn parse_signed(s: &str, positive: char, negative: char) -> Option<i32> {
    let mut chars = s.chars();
    let sign = match chars.next()?.to_ascii_uppercase() {
        c if c == positive => 1,
        c if c == negative => -1,
        _ => return None,
    };
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i32 = digits.parse().ok()?;
    Some(value * sign)
}
