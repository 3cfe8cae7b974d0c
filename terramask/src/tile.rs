//! Raw tile formats and their decoding into [`ElevationGrid`]s.
//!
//! Two wire formats are supported:
//!
//! - **DTED** levels 0/1/2 (`.dt0`, `.dt1`, `.dt2`): a 3428-byte header
//!   followed by one record per column (west to east). Each record holds an
//!   8-byte record header, `posts` big-endian *sign-magnitude* values from
//!   south to north, and a 4-byte checksum.
//! - **SRTM HGT** (`.hgt`): no header, `posts²` big-endian two's-complement
//!   values in rows from the north-west corner. SRTM1 and SRTM3 are told
//!   apart by file size alone.
//!
//! Both decode to the same south-up, column-major layout. [`HgtTile`] reads
//! HGT files in place through a memory map for on-demand lookups.

use std::fs::{self, File};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Result, TerrainError};
use crate::grid::{ElevationGrid, PostGrid, NO_DATA, NO_DATA_F64};

/// DTED user header + data set identification + accuracy description.
const DTED_HEADER_LEN: usize = 3428;

/// Sentinel, block count and longitude/latitude counts preceding each column.
const DTED_RECORD_HEADER_LEN: usize = 8;

/// Trailing checksum of each DTED column record.
const DTED_CHECKSUM_LEN: usize = 4;

/// File size for SRTM1 (1 arc-second, ~30m resolution): 3601 × 3601 × 2 bytes
pub const SRTM1_SIZE: usize = 3601 * 3601 * 2; // 25,934,402 bytes

/// File size for SRTM3 (3 arc-second, ~90m resolution): 1201 × 1201 × 2 bytes
pub const SRTM3_SIZE: usize = 1201 * 1201 * 2; // 2,884,802 bytes

/// Value marking a void in raw HGT files; remapped to [`NO_DATA`] on read.
pub const HGT_VOID: i16 = -32768;

/// Source format of a raw tile, resolved once at detection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    /// DTED level 0: 121 posts per side (30 arc-seconds).
    Dted0,
    /// DTED level 1: 1201 posts per side (3 arc-seconds).
    Dted1,
    /// DTED level 2: 3601 posts per side (1 arc-second).
    Dted2,
    /// SRTM1 HGT: 3601 posts per side.
    Srtm1,
    /// SRTM3 HGT: 1201 posts per side.
    Srtm3,
}

impl TileFormat {
    /// Number of posts per row/column.
    pub fn posts(&self) -> usize {
        match self {
            TileFormat::Dted0 => 121,
            TileFormat::Dted1 | TileFormat::Srtm3 => 1201,
            TileFormat::Dted2 | TileFormat::Srtm1 => 3601,
        }
    }

    /// Approximate post spacing in meters.
    pub fn meters(&self) -> f64 {
        match self {
            TileFormat::Dted0 => 900.0,
            TileFormat::Dted1 | TileFormat::Srtm3 => 90.0,
            TileFormat::Dted2 | TileFormat::Srtm1 => 30.0,
        }
    }

    pub fn is_dted(&self) -> bool {
        matches!(self, TileFormat::Dted0 | TileFormat::Dted1 | TileFormat::Dted2)
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Dted0 => "dt0",
            TileFormat::Dted1 => "dt1",
            TileFormat::Dted2 => "dt2",
            TileFormat::Srtm1 | TileFormat::Srtm3 => "hgt",
        }
    }

    /// Exact byte size of a raw tile in this format.
    pub fn file_size(&self) -> usize {
        let posts = self.posts();
        if self.is_dted() {
            DTED_HEADER_LEN + posts * dted_record_len(posts)
        } else {
            posts * posts * 2
        }
    }

    /// DTED level from a file extension (case-insensitive).
    ///
    /// HGT resolution can't be known from the extension; see
    /// [`TileFormat::from_hgt_size`].
    pub fn from_dted_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "dt0" => Some(TileFormat::Dted0),
            "dt1" => Some(TileFormat::Dted1),
            "dt2" => Some(TileFormat::Dted2),
            _ => None,
        }
    }

    /// SRTM resolution from a raw `.hgt` byte count.
    pub fn from_hgt_size(size: usize) -> Option<Self> {
        match size {
            SRTM1_SIZE => Some(TileFormat::Srtm1),
            SRTM3_SIZE => Some(TileFormat::Srtm3),
            _ => None,
        }
    }

    /// Detect the format of a tile file from its extension and, for HGT, its size.
    pub fn detect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if let Some(format) = Self::from_dted_extension(&ext) {
            return Ok(format);
        }
        if ext == "hgt" {
            let size = fs::metadata(path)?.len() as usize;
            return Self::from_hgt_size(size).ok_or(TerrainError::InvalidFileSize {
                size,
                expected: format!("{} for SRTM1 or {} for SRTM3", SRTM1_SIZE, SRTM3_SIZE),
            });
        }

        Err(TerrainError::UnrecognizedFormat {
            path: path.to_path_buf(),
        })
    }

    /// Preference when a source tree holds several formats: higher wins.
    ///
    /// DTED levels outrank flat HGT files regardless of post count.
    pub fn preference(&self) -> u8 {
        match self {
            TileFormat::Dted2 => 5,
            TileFormat::Dted1 => 4,
            TileFormat::Dted0 => 3,
            TileFormat::Srtm1 => 2,
            TileFormat::Srtm3 => 1,
        }
    }
}

impl std::fmt::Display for TileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TileFormat::Dted0 => "DTED0",
            TileFormat::Dted1 => "DTED1",
            TileFormat::Dted2 => "DTED2",
            TileFormat::Srtm1 => "SRTM1",
            TileFormat::Srtm3 => "SRTM3",
        };
        write!(f, "{} (~{}m)", name, self.meters())
    }
}

fn dted_record_len(posts: usize) -> usize {
    DTED_RECORD_HEADER_LEN + posts * 2 + DTED_CHECKSUM_LEN
}

/// Decode a big-endian DTED sign-magnitude value.
///
/// Bit 15 is the sign and bits 0–14 the magnitude, so `0x8032` is −50 and
/// `0xFFFF` (the DTED null) lands on [`NO_DATA`].
#[inline]
pub fn decode_sign_magnitude(hi: u8, lo: u8) -> i16 {
    let raw = u16::from_be_bytes([hi, lo]);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decode a raw tile in the given format.
///
/// # Errors
///
/// Returns [`TerrainError::InvalidFileSize`] if `bytes` is too short for a
/// DTED tile of this level, or isn't exactly the HGT size for this resolution.
pub fn parse(bytes: &[u8], format: TileFormat) -> Result<ElevationGrid> {
    if format.is_dted() {
        parse_dted(bytes, format.posts())
    } else {
        parse_hgt(bytes, format.posts())
    }
}

fn parse_dted(bytes: &[u8], posts: usize) -> Result<ElevationGrid> {
    let expected = DTED_HEADER_LEN + posts * dted_record_len(posts);
    if bytes.len() < expected {
        return Err(TerrainError::InvalidFileSize {
            size: bytes.len(),
            expected: format!("at least {} for {} posts", expected, posts),
        });
    }

    let mut data = Vec::with_capacity(posts * posts);
    let mut offset = DTED_HEADER_LEN;
    for _ in 0..posts {
        offset += DTED_RECORD_HEADER_LEN;
        let column = &bytes[offset..offset + posts * 2];
        data.extend(
            column
                .chunks_exact(2)
                .map(|pair| decode_sign_magnitude(pair[0], pair[1])),
        );
        offset += posts * 2 + DTED_CHECKSUM_LEN;
    }

    ElevationGrid::from_columns(posts, data)
}

fn parse_hgt(bytes: &[u8], posts: usize) -> Result<ElevationGrid> {
    let expected = posts * posts * 2;
    if bytes.len() != expected {
        return Err(TerrainError::InvalidFileSize {
            size: bytes.len(),
            expected: expected.to_string(),
        });
    }

    let mut data = vec![NO_DATA; posts * posts];
    for (stream_row, row_bytes) in bytes.chunks_exact(posts * 2).enumerate() {
        // Stream row 0 is the northern edge
        let row = posts - 1 - stream_row;
        for (col, pair) in row_bytes.chunks_exact(2).enumerate() {
            data[col * posts + row] = hgt_value(pair[0], pair[1]);
        }
    }

    ElevationGrid::from_columns(posts, data)
}

#[inline]
fn hgt_value(hi: u8, lo: u8) -> i16 {
    match i16::from_be_bytes([hi, lo]) {
        HGT_VOID => NO_DATA,
        v => v,
    }
}

/// Read and decode a tile file, detecting its format.
pub fn read_tile<P: AsRef<Path>>(path: P) -> Result<(TileFormat, ElevationGrid)> {
    let path = path.as_ref();
    let format = TileFormat::detect(path)?;
    let bytes = fs::read(path)?;
    let grid = parse(&bytes, format)?;
    tracing::trace!(path = %path.display(), %format, "Decoded tile");
    Ok((format, grid))
}

/// A memory-mapped SRTM `.hgt` tile read in place.
///
/// Used for on-demand high-resolution lookups where decoding the whole tile
/// would be wasteful.
pub struct HgtTile {
    /// Memory-mapped file data
    data: Mmap,
    /// Number of samples per row/column (1201 or 3601)
    posts: usize,
    format: TileFormat,
    /// Southwest corner latitude (integer)
    base_lat: i32,
    /// Southwest corner longitude (integer)
    base_lon: i32,
}

impl HgtTile {
    /// Map an HGT file whose south-west corner is `(base_lat, base_lon)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or memory-mapped, or if
    /// its size matches neither SRTM1 nor SRTM3.
    pub fn open<P: AsRef<Path>>(path: P, base_lat: i32, base_lon: i32) -> Result<Self> {
        let file = File::open(&path)?;

        // SAFETY: Memory mapping is safe as long as the file is not modified
        // while mapped. We open the file read-only and don't expose the mapping.
        let mmap = unsafe { Mmap::map(&file)? };

        let format = TileFormat::from_hgt_size(mmap.len()).ok_or(TerrainError::InvalidFileSize {
            size: mmap.len(),
            expected: format!("{} for SRTM1 or {} for SRTM3", SRTM1_SIZE, SRTM3_SIZE),
        })?;

        Ok(Self {
            data: mmap,
            posts: format.posts(),
            format,
            base_lat,
            base_lon,
        })
    }

    /// Interpolated elevation at the given coordinates.
    ///
    /// Returns [`NO_DATA_F64`] if the point lies outside this tile.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        let fy = lat - self.base_lat as f64;
        let fx = lon - self.base_lon as f64;
        if !(0.0..=1.0).contains(&fx) || !(0.0..=1.0).contains(&fy) {
            return NO_DATA_F64;
        }
        self.interpolate(fx, fy)
    }

    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// Returns the base latitude (southwest corner).
    pub fn base_lat(&self) -> i32 {
        self.base_lat
    }

    /// Returns the base longitude (southwest corner).
    pub fn base_lon(&self) -> i32 {
        self.base_lon
    }
}

impl PostGrid for HgtTile {
    fn posts(&self) -> usize {
        self.posts
    }

    #[inline]
    fn post(&self, col: usize, row: usize) -> i16 {
        // The file stores rows from north to south
        let stream_row = self.posts - 1 - row;
        let offset = (stream_row * self.posts + col) * 2;
        hgt_value(self.data[offset], self.data[offset + 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    /// Raw DTED bytes whose column `c`, row `r` raw word is `word(c, r)`.
    fn dted_bytes(posts: usize, word: impl Fn(usize, usize) -> u16) -> Vec<u8> {
        let mut bytes = vec![0u8; DTED_HEADER_LEN];
        for col in 0..posts {
            bytes.extend_from_slice(&[0xAA, 0, 0, col as u8, 0, col as u8, 0, 0]);
            for row in 0..posts {
                bytes.extend_from_slice(&word(col, row).to_be_bytes());
            }
            bytes.extend_from_slice(&[0, 0, 0, 0]);
        }
        bytes
    }

    /// Raw SRTM3 bytes with every sample of stream row `r` set to `value(r)`.
    fn hgt_bytes(value: impl Fn(usize) -> i16) -> Vec<u8> {
        let posts = 1201;
        let mut bytes = Vec::with_capacity(SRTM3_SIZE);
        for stream_row in 0..posts {
            let v = value(stream_row).to_be_bytes();
            for _ in 0..posts {
                bytes.extend_from_slice(&v);
            }
        }
        bytes
    }

    #[test]
    fn test_sign_magnitude_decode() {
        assert_eq!(decode_sign_magnitude(0x80, 0x32), -50);
        assert_eq!(decode_sign_magnitude(0x00, 0x32), 50);
        assert_eq!(decode_sign_magnitude(0x00, 0x00), 0);
        assert_eq!(decode_sign_magnitude(0x80, 0x00), 0);
        assert_eq!(decode_sign_magnitude(0xFF, 0xFF), NO_DATA);
        // Two's complement would have read 0x8032 as -32718
        assert_ne!(decode_sign_magnitude(0x80, 0x32), i16::from_be_bytes([0x80, 0x32]));
    }

    #[test]
    fn test_parse_dted_level0() {
        let bytes = dted_bytes(121, |col, row| {
            if col == 5 && row == 7 {
                0x8032
            } else {
                (col * 2 + row) as u16
            }
        });
        assert_eq!(bytes.len(), TileFormat::Dted0.file_size());

        let grid = parse(&bytes, TileFormat::Dted0).unwrap();
        assert_eq!(grid.posts(), 121);
        assert_eq!(grid.post(5, 7), -50);
        assert_eq!(grid.post(0, 0), 0);
        assert_eq!(grid.post(3, 120), 126);
        assert_eq!(grid.post(120, 0), 240);
    }

    #[test]
    fn test_parse_dted_truncated() {
        let mut bytes = dted_bytes(121, |_, _| 10);
        bytes.truncate(bytes.len() - 1);
        let result = parse(&bytes, TileFormat::Dted0);
        assert!(matches!(result, Err(TerrainError::InvalidFileSize { .. })));
    }

    #[test]
    fn test_parse_hgt_flips_rows() {
        let bytes = hgt_bytes(|stream_row| match stream_row {
            0 => 100,
            1200 => 200,
            _ => 0,
        });
        let grid = parse(&bytes, TileFormat::Srtm3).unwrap();

        for col in [0, 600, 1200] {
            assert_eq!(grid.post(col, 1200), 100);
            assert_eq!(grid.post(col, 0), 200);
            assert_eq!(grid.post(col, 600), 0);
        }
    }

    #[test]
    fn test_parse_hgt_remaps_void() {
        let bytes = hgt_bytes(|stream_row| if stream_row == 0 { HGT_VOID } else { -5 });
        let grid = parse(&bytes, TileFormat::Srtm3).unwrap();
        assert_eq!(grid.post(0, 1200), NO_DATA);
        assert_eq!(grid.post(0, 0), -5);
    }

    #[test]
    fn test_parse_hgt_wrong_size() {
        let result = parse(&[0u8; 1000], TileFormat::Srtm3);
        assert!(matches!(
            result,
            Err(TerrainError::InvalidFileSize { size: 1000, .. })
        ));
    }

    #[test]
    fn test_format_sizes() {
        assert_eq!(TileFormat::Srtm1.file_size(), SRTM1_SIZE);
        assert_eq!(TileFormat::Srtm3.file_size(), SRTM3_SIZE);
        assert_eq!(TileFormat::Dted0.file_size(), 3428 + 121 * (12 + 242));
        assert_eq!(TileFormat::from_hgt_size(SRTM1_SIZE), Some(TileFormat::Srtm1));
        assert_eq!(TileFormat::from_hgt_size(SRTM3_SIZE), Some(TileFormat::Srtm3));
        assert_eq!(TileFormat::from_hgt_size(1000), None);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TileFormat::from_dted_extension("dt0"), Some(TileFormat::Dted0));
        assert_eq!(TileFormat::from_dted_extension("DT1"), Some(TileFormat::Dted1));
        assert_eq!(TileFormat::from_dted_extension("dt2"), Some(TileFormat::Dted2));
        assert_eq!(TileFormat::from_dted_extension("dt3"), None);
        assert_eq!(TileFormat::from_dted_extension("hgt"), None);
    }

    #[test]
    fn test_preference_order() {
        let mut formats = vec![
            TileFormat::Srtm1,
            TileFormat::Dted0,
            TileFormat::Dted2,
            TileFormat::Srtm3,
            TileFormat::Dted1,
        ];
        formats.sort_by_key(|f| std::cmp::Reverse(f.preference()));
        assert_eq!(formats[0], TileFormat::Dted2);
        assert_eq!(formats[1], TileFormat::Dted1);
        assert_eq!(formats[2], TileFormat::Dted0);
    }

    #[test]
    fn test_detect_and_read() {
        let dir = TempDir::new().unwrap();

        let dted_path = dir.path().join("n38.dt0");
        fs::write(&dted_path, dted_bytes(121, |_, _| 0x8001)).unwrap();
        let (format, grid) = read_tile(&dted_path).unwrap();
        assert_eq!(format, TileFormat::Dted0);
        assert_eq!(grid.post(60, 60), -1);

        let hgt_path = dir.path().join("N38E027.hgt");
        fs::write(&hgt_path, hgt_bytes(|_| 42)).unwrap();
        assert_eq!(TileFormat::detect(&hgt_path).unwrap(), TileFormat::Srtm3);

        let bad_path = dir.path().join("N38E027.tif");
        fs::write(&bad_path, [0u8; 4]).unwrap();
        assert!(matches!(
            TileFormat::detect(&bad_path),
            Err(TerrainError::UnrecognizedFormat { .. })
        ));

        let short_hgt = dir.path().join("N00E000.hgt");
        fs::write(&short_hgt, [0u8; 10]).unwrap();
        assert!(matches!(
            TileFormat::detect(&short_hgt),
            Err(TerrainError::InvalidFileSize { size: 10, .. })
        ));
    }

    #[test]
    fn test_hgt_tile_matches_decoded_grid() {
        let mut file = NamedTempFile::new().unwrap();
        let bytes = hgt_bytes(|stream_row| (stream_row % 300) as i16);
        file.write_all(&bytes).unwrap();

        let tile = HgtTile::open(file.path(), 38, 27).unwrap();
        let grid = parse(&bytes, TileFormat::Srtm3).unwrap();

        assert_eq!(tile.format(), TileFormat::Srtm3);
        for (col, row) in [(0, 0), (10, 1199), (600, 600), (1200, 1200)] {
            assert_eq!(tile.post(col, row), grid.post(col, row));
        }
        for (lat, lon) in [(38.25, 27.75), (38.5, 27.5), (38.9, 27.1)] {
            let fx = lon - 27.0;
            let fy = lat - 38.0;
            assert_eq!(tile.elevation_at(lat, lon), grid.interpolate(fx, fy));
        }
        assert_eq!(tile.elevation_at(40.0, 27.5), NO_DATA_F64);
    }

    #[test]
    fn test_hgt_tile_invalid_size() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 1000]).unwrap();

        match HgtTile::open(file.path(), 0, 0) {
            Err(TerrainError::InvalidFileSize { size, .. }) => assert_eq!(size, 1000),
            _ => panic!("Expected InvalidFileSize error"),
        }
    }
}
