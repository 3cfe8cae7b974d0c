//! Versioned binary elevation cache: building, loading and point lookups.
//!
//! A cache file packs every tile of a rectangular lon/lat area into one file
//! so a whole region loads with a single sequential read.
//!
//! # File Layout
//!
//! All integers are big-endian.
//!
//! | Offset | Field | Type |
//! |--------|-------|------|
//! | 0 | magic `DTCACHE1` or `DTCACHE2` | 8 bytes ASCII |
//! | 8 | `min_lon` | i32 |
//! | 12 | `min_lat` | i32 |
//! | 16 | `max_lon` | i32 |
//! | 20 | `max_lat` | i32 |
//! | 24 | `cols` | i32 |
//! | 28 | `rows` | i32 |
//! | 32 | `tile_posts` (v2 only, v1 implies 121) | i32 |
//!
//! The body holds one cell per tile, longitude outer and latitude inner: a
//! presence byte and, when non-zero, `tile_posts²` i16 posts in the tile's
//! column-major order.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::coverage::{TileBounds, TileKey};
use crate::error::{Result, TerrainError};
use crate::filename::{dted_path_to_lat_lon, filename_to_lat_lon};
use crate::grid::{check_posts, ElevationGrid, PostGrid, NO_DATA_F64};
use crate::tile::{read_tile, TileFormat};

/// Magic of version 1 caches (always 121 posts per tile).
pub const MAGIC_V1: &[u8; 8] = b"DTCACHE1";

/// Magic of version 2 caches (explicit `tile_posts`).
pub const MAGIC_V2: &[u8; 8] = b"DTCACHE2";

/// Posts per side implied by a version 1 cache.
pub const V1_TILE_POSTS: usize = 121;

/// On-disk cache format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVersion {
    V1,
    V2,
}

impl CacheVersion {
    pub fn magic(&self) -> &'static [u8; 8] {
        match self {
            CacheVersion::V1 => MAGIC_V1,
            CacheVersion::V2 => MAGIC_V2,
        }
    }

    fn from_magic(magic: &[u8; 8]) -> Result<Self> {
        match magic {
            m if m == MAGIC_V1 => Ok(CacheVersion::V1),
            m if m == MAGIC_V2 => Ok(CacheVersion::V2),
            _ => Err(TerrainError::BadMagic {
                found: String::from_utf8_lossy(magic).into_owned(),
            }),
        }
    }
}

/// Decoded cache header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    pub version: CacheVersion,
    pub bounds: TileBounds,
    pub tile_posts: usize,
}

impl CacheHeader {
    /// Read and validate a header.
    ///
    /// The magic is checked before anything else; an unknown magic is a
    /// [`TerrainError::BadMagic`] and never falls back to a default version.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        let version = CacheVersion::from_magic(&magic)?;

        let min_lon = read_i32(reader)?;
        let min_lat = read_i32(reader)?;
        let max_lon = read_i32(reader)?;
        let max_lat = read_i32(reader)?;
        let cols = read_i32(reader)?;
        let rows = read_i32(reader)?;
        let tile_posts = match version {
            CacheVersion::V1 => V1_TILE_POSTS as i32,
            CacheVersion::V2 => read_i32(reader)?,
        };

        let bounds = TileBounds::new(min_lon, min_lat, max_lon, max_lat);
        bounds.validate().map_err(corrupt)?;
        if cols as i64 != bounds.cols() as i64 || rows as i64 != bounds.rows() as i64 {
            return Err(corrupt(format!(
                "{}x{} cells declared for a {}x{} rectangle",
                cols,
                rows,
                bounds.cols(),
                bounds.rows()
            )));
        }
        let tile_posts = usize::try_from(tile_posts)
            .ok()
            .filter(|&posts| check_posts(posts).is_ok())
            .ok_or_else(|| corrupt(format!("unsupported tile_posts {}", tile_posts)))?;

        Ok(Self {
            version,
            bounds,
            tile_posts,
        })
    }

    /// Write this header. `tile_posts` is omitted for version 1.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.version.magic())?;
        for v in [
            self.bounds.min_lon,
            self.bounds.min_lat,
            self.bounds.max_lon,
            self.bounds.max_lat,
            self.bounds.cols() as i32,
            self.bounds.rows() as i32,
        ] {
            writer.write_all(&v.to_be_bytes())?;
        }
        if self.version == CacheVersion::V2 {
            writer.write_all(&(self.tile_posts as i32).to_be_bytes())?;
        }
        Ok(())
    }

    /// Number of tile cells in the body.
    pub fn cell_count(&self) -> usize {
        self.bounds.cols() * self.bounds.rows()
    }
}

/// Read only the header of a cache file.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<CacheHeader> {
    let mut reader = BufReader::new(File::open(path)?);
    CacheHeader::read_from(&mut reader)
}

/// An immutable, fully loaded tile matrix.
///
/// Loading is all-or-nothing: either every cell was read or an error is
/// returned and nothing is kept. To pick up new data, load a new cache and
/// replace the old value; an existing instance is never modified.
#[derive(Debug, Clone)]
pub struct ElevationCache {
    version: CacheVersion,
    bounds: TileBounds,
    tile_posts: usize,
    /// Lon-outer, lat-inner, see [`TileBounds::index_of`].
    tiles: Vec<Option<ElevationGrid>>,
}

impl ElevationCache {
    /// Assemble a cache over `bounds` from the tiles that are present.
    ///
    /// # Errors
    ///
    /// Fails if `bounds` leave the globe, if `tile_posts` is unsupported, or
    /// if a tile lies outside `bounds` or doesn't have `tile_posts` posts per
    /// side. Anything accepted here can be saved and loaded back.
    pub fn with_bounds<I>(bounds: TileBounds, tile_posts: usize, tiles: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TileKey, ElevationGrid)>,
    {
        bounds
            .validate()
            .map_err(|reason| TerrainError::InvalidParameter { name: "bounds", reason })?;
        check_posts(tile_posts)?;
        let mut cells = vec![None; bounds.cols() * bounds.rows()];
        for (key, grid) in tiles {
            let index = bounds.index_of(key).ok_or_else(|| TerrainError::InvalidParameter {
                name: "tiles",
                reason: format!("tile {} lies outside {:?}", key, bounds),
            })?;
            if grid.posts() != tile_posts {
                return Err(TerrainError::InvalidParameter {
                    name: "tiles",
                    reason: format!(
                        "tile {} has {} posts, cache uses {}",
                        key,
                        grid.posts(),
                        tile_posts
                    ),
                });
            }
            cells[index] = Some(grid);
        }

        Ok(Self {
            version: CacheVersion::V2,
            bounds,
            tile_posts,
            tiles: cells,
        })
    }

    /// Assemble a cache whose bounds enclose exactly the given tiles.
    pub fn from_tiles<I>(tile_posts: usize, tiles: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TileKey, ElevationGrid)>,
    {
        let tiles: Vec<_> = tiles.into_iter().collect();
        let bounds = TileBounds::enclosing(tiles.iter().map(|(k, _)| *k)).ok_or_else(|| {
            TerrainError::InvalidParameter {
                name: "tiles",
                reason: "at least one tile is required".to_string(),
            }
        })?;
        Self::with_bounds(bounds, tile_posts, tiles)
    }

    /// Load a cache file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_progress(path, |_, _| {})
    }

    /// Load a cache file, reporting `(cells_read, cells_total)` after each cell.
    pub fn load_with_progress<P, F>(path: P, progress: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: FnMut(usize, usize),
    {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let cache = Self::read_from(&mut reader, progress)?;
        tracing::info!(
            path = %path.display(),
            version = ?cache.version,
            tile_posts = cache.tile_posts,
            tiles = cache.present_count(),
            "Loaded elevation cache"
        );
        Ok(cache)
    }

    /// Decode a cache from a reader.
    pub fn read_from<R, F>(reader: &mut R, mut progress: F) -> Result<Self>
    where
        R: Read,
        F: FnMut(usize, usize),
    {
        let header = CacheHeader::read_from(reader)?;
        let total = header.cell_count();
        let posts = header.tile_posts;

        let mut tiles = Vec::with_capacity(total);
        let mut buf = vec![0u8; posts * posts * 2];
        for index in 0..total {
            let mut presence = [0u8; 1];
            reader.read_exact(&mut presence)?;
            if presence[0] != 0 {
                reader.read_exact(&mut buf)?;
                let data = buf
                    .chunks_exact(2)
                    .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                tiles.push(Some(ElevationGrid::from_columns(posts, data)?));
            } else {
                tiles.push(None);
            }
            progress(index + 1, total);
        }

        Ok(Self {
            version: header.version,
            bounds: header.bounds,
            tile_posts: posts,
            tiles,
        })
    }

    /// Encode this cache as a version 2 file body.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let header = CacheHeader {
            version: CacheVersion::V2,
            bounds: self.bounds,
            tile_posts: self.tile_posts,
        };
        header.write_to(writer)?;
        for cell in &self.tiles {
            write_cell(writer, cell.as_ref())?;
        }
        Ok(())
    }

    /// Write this cache to `path`, replacing any existing file atomically.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_atomically(path.as_ref(), |writer| self.write_to(writer)).map(|_| ())
    }

    /// Interpolated elevation at a point, or [`NO_DATA_F64`] outside the
    /// cache rectangle or over an absent tile.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        if !lat.is_finite() || !lon.is_finite() {
            return NO_DATA_F64;
        }
        let key = TileKey::containing(lat, lon);
        match self.tile(key) {
            Some(grid) => grid.interpolate(lon - key.lon as f64, lat - key.lat as f64),
            None => NO_DATA_F64,
        }
    }

    /// The grid of a tile, if it is inside the rectangle and present.
    pub fn tile(&self, key: TileKey) -> Option<&ElevationGrid> {
        self.bounds
            .index_of(key)
            .and_then(|index| self.tiles[index].as_ref())
    }

    /// Whether the point falls on a present tile.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat.is_finite() && lon.is_finite() && self.tile(TileKey::containing(lat, lon)).is_some()
    }

    /// Present tiles in lon-outer, lat-inner order.
    pub fn present_tiles(&self) -> impl Iterator<Item = (TileKey, &ElevationGrid)> {
        self.bounds
            .keys()
            .zip(self.tiles.iter())
            .filter_map(|(key, cell)| cell.as_ref().map(|grid| (key, grid)))
    }

    pub fn present_count(&self) -> usize {
        self.tiles.iter().filter(|cell| cell.is_some()).count()
    }

    pub fn bounds(&self) -> TileBounds {
        self.bounds
    }

    pub fn tile_posts(&self) -> usize {
        self.tile_posts
    }

    /// Format version of the file this cache was loaded from.
    pub fn version(&self) -> CacheVersion {
        self.version
    }
}

fn write_cell<W: Write>(writer: &mut W, cell: Option<&ElevationGrid>) -> Result<()> {
    match cell {
        Some(grid) => {
            writer.write_all(&[1])?;
            let mut bytes = Vec::with_capacity(grid.as_slice().len() * 2);
            for v in grid.as_slice() {
                bytes.extend_from_slice(&v.to_be_bytes());
            }
            writer.write_all(&bytes)?;
        }
        None => writer.write_all(&[0])?,
    }
    Ok(())
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn corrupt(reason: String) -> TerrainError {
    TerrainError::CorruptCache { reason }
}

/// Write through `f` into a temporary file beside `path`, then rename it
/// over `path`.
fn write_atomically<F>(path: &Path, f: F) -> Result<u64>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        f(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    let size = temp.as_file().metadata()?.len();
    temp.persist(path).map_err(|e| TerrainError::Io(e.error))?;
    Ok(size)
}

/// A raw tile file found under a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTile {
    pub key: TileKey,
    pub format: TileFormat,
    pub path: PathBuf,
}

/// Walk `root` for DTED trees (`lonDir/latFile.dtN`) and flat `.hgt` files.
///
/// Only the root and its immediate subdirectories are searched. Files that
/// don't follow either naming convention are ignored, as are `.hgt` files
/// whose size matches neither SRTM resolution.
pub fn discover_tiles<P: AsRef<Path>>(root: P) -> Result<Vec<DiscoveredTile>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root.as_ref())? {
        let path = entry?.path();
        if path.is_dir() {
            for inner in fs::read_dir(&path)? {
                let inner = inner?.path();
                if let Some((format, key)) = classify_dted(&inner) {
                    found.push(DiscoveredTile {
                        key,
                        format,
                        path: inner,
                    });
                }
            }
        } else if let Some((format, key)) = classify_hgt(&path) {
            found.push(DiscoveredTile { key, format, path });
        }
    }
    found.sort_by(|a, b| a.key.cmp(&b.key).then(a.path.cmp(&b.path)));
    Ok(found)
}

/// Raw tiles discovered under a source root, all of one format.
#[derive(Debug, Clone)]
pub struct SourceScan {
    pub format: TileFormat,
    pub tiles: BTreeMap<TileKey, PathBuf>,
    /// Tile files passed over because another format or resolution won.
    pub ignored: usize,
}

impl SourceScan {
    /// Pick the best format available under `root`.
    ///
    /// The best available format wins (`.dt2` > `.dt1` > `.dt0` > `.hgt`,
    /// SRTM1 before SRTM3); files of other formats are counted in
    /// [`ignored`](Self::ignored).
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let discovered = discover_tiles(root)?;
        let total = discovered.len();

        let format = discovered
            .iter()
            .map(|t| t.format)
            .max_by_key(|f| f.preference())
            .ok_or_else(|| TerrainError::NoTiles {
                root: root.to_path_buf(),
            })?;
        let tiles: BTreeMap<TileKey, PathBuf> = discovered
            .into_iter()
            .filter(|t| t.format == format)
            .map(|t| (t.key, t.path))
            .collect();
        let ignored = total - tiles.len();

        if ignored > 0 {
            tracing::warn!(
                root = %root.display(),
                %format,
                ignored,
                "Mixed tile formats found, using the best resolution only"
            );
        }
        tracing::debug!(root = %root.display(), %format, tiles = tiles.len(), "Scanned source tiles");

        Ok(Self {
            format,
            tiles,
            ignored,
        })
    }

    /// Smallest rectangle enclosing every discovered tile.
    pub fn bounds(&self) -> Option<TileBounds> {
        TileBounds::enclosing(self.tiles.keys().copied())
    }
}

fn classify_dted(path: &Path) -> Option<(TileFormat, TileKey)> {
    let ext = path.extension()?.to_str()?;
    let format = TileFormat::from_dted_extension(ext)?;
    let (lat, lon) = dted_path_to_lat_lon(path)?;
    Some((format, TileKey::new(lon, lat)))
}

fn classify_hgt(path: &Path) -> Option<(TileFormat, TileKey)> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case("hgt") {
        return None;
    }
    let (lat, lon) = filename_to_lat_lon(path.file_name()?.to_str()?)?;
    let size = fs::metadata(path).ok()?.len() as usize;
    match TileFormat::from_hgt_size(size) {
        Some(format) => Some((format, TileKey::new(lon, lat))),
        None => {
            tracing::warn!(path = %path.display(), size, "Skipping HGT file with unexpected size");
            None
        }
    }
}

/// Summary of a finished cache build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub format: TileFormat,
    pub bounds: TileBounds,
    pub tiles_written: usize,
    pub tiles_ignored: usize,
    /// Size of the written cache file in bytes.
    pub bytes: u64,
}

/// Build a version 2 cache from the raw tiles under `source_root`.
pub fn build<P: AsRef<Path>, Q: AsRef<Path>>(source_root: P, out_file: Q) -> Result<BuildReport> {
    build_with_progress(source_root, out_file, |_, _| {})
}

/// Build a cache, reporting `(cells_written, cells_total)` after each cell.
///
/// Tiles are decoded one at a time and streamed to a temporary file that
/// replaces `out_file` only once the whole cache has been written. Any tile
/// that fails to decode aborts the build and leaves `out_file` untouched.
pub fn build_with_progress<P, Q, F>(source_root: P, out_file: Q, mut progress: F) -> Result<BuildReport>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    F: FnMut(usize, usize),
{
    let source_root = source_root.as_ref();
    let out_file = out_file.as_ref();

    let scan = SourceScan::scan(source_root)?;
    let bounds = scan.bounds().ok_or_else(|| TerrainError::NoTiles {
        root: source_root.to_path_buf(),
    })?;
    let header = CacheHeader {
        version: CacheVersion::V2,
        bounds,
        tile_posts: scan.format.posts(),
    };
    let total = header.cell_count();

    tracing::info!(
        source = %source_root.display(),
        out = %out_file.display(),
        format = %scan.format,
        tiles = scan.tiles.len(),
        ?bounds,
        "Building elevation cache"
    );

    let bytes = write_atomically(out_file, |writer| {
        header.write_to(writer)?;
        for (index, key) in bounds.keys().enumerate() {
            match scan.tiles.get(&key) {
                Some(path) => {
                    let (format, grid) = read_tile(path).inspect_err(|e| {
                        tracing::error!(path = %path.display(), error = %e, "Failed to decode tile");
                    })?;
                    if format != scan.format {
                        return Err(TerrainError::UnrecognizedFormat { path: path.clone() });
                    }
                    write_cell(writer, Some(&grid))?;
                }
                None => write_cell(writer, None)?,
            }
            progress(index + 1, total);
        }
        Ok(())
    })?;

    tracing::info!(out = %out_file.display(), bytes, "Elevation cache written");

    Ok(BuildReport {
        format: scan.format,
        bounds,
        tiles_written: scan.tiles.len(),
        tiles_ignored: scan.ignored,
        bytes,
    })
}
