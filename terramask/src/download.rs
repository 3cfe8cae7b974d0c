//! SRTM tile acquisition.
//!
//! This module fetches the flat `.hgt` tiles covering an area into a local
//! directory so they can be fed to the cache builder or used for
//! high-resolution point queries. It is only available when the `download`
//! feature is enabled.
//!
//! Acquisition is idempotent: a tile already on disk with the size expected
//! for the configured resolution is skipped, so re-running after an
//! interruption resumes where it left off. A tile that fails to download is
//! counted and the batch carries on; nothing is retried automatically.

use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use zip::ZipArchive;

use crate::coverage::{tiles_covering, TileKey};
use crate::error::{Result, TerrainError};
use crate::filename::{coords_to_filename, lat_band};
use crate::geo::GeoPoint;
use crate::tile::TileFormat;

/// Compression format of downloaded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// No compression - raw .hgt file
    #[default]
    None,
    /// Gzip compression (.hgt.gz)
    Gzip,
    /// ZIP archive (.hgt.zip)
    Zip,
}

impl Compression {
    /// Detect compression format from a URL or filename.
    ///
    /// # Examples
    ///
    /// ```
    /// use terramask::download::Compression;
    ///
    /// assert_eq!(Compression::from_url("file.hgt.gz"), Compression::Gzip);
    /// assert_eq!(Compression::from_url("file.hgt.zip"), Compression::Zip);
    /// assert_eq!(Compression::from_url("file.hgt"), Compression::None);
    /// ```
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.ends_with(".gz") {
            Compression::Gzip
        } else if lower.ends_with(".zip") {
            Compression::Zip
        } else {
            Compression::None
        }
    }
}

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Base URL of the public Skadi tile store.
const SKADI_BASE_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/skadi";

/// Known tile sources.
#[derive(Debug, Clone, Default)]
pub enum TileSource {
    /// Mapzen/AWS terrain tiles in Skadi layout - SRTM1, gzip.
    /// URL pattern: `https://s3.amazonaws.com/elevation-tiles-prod/skadi/{lat_band}/{filename}.hgt.gz`
    #[default]
    AwsSkadi,

    /// ArduPilot terrain server - SRTM1, zip.
    /// URL pattern: `https://terrain.ardupilot.org/SRTM1/{filename}.hgt.zip`
    ArduPilotSrtm1,

    /// Custom URL template.
    ///
    /// Placeholders:
    /// - `{filename}` - tile name without extension (e.g., "N38E027")
    /// - `{lat_band}` - latitude band directory (e.g., "N38")
    /// - `{lat_prefix}`, `{lat}` - "N" and "38"
    /// - `{lon_prefix}`, `{lon}` - "E" and "027"
    Custom {
        /// URL template with placeholders
        url_template: String,
        /// Compression format of the downloaded file
        compression: Compression,
    },
}

/// Configuration for acquiring tiles.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// The source to download from.
    pub source: TileSource,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Resolution the source serves; sets the expected tile size.
    pub format: TileFormat,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            source: TileSource::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            format: TileFormat::Srtm1,
        }
    }
}

impl DownloadConfig {
    /// Download from the public Skadi store (the default).
    pub fn aws_skadi() -> Self {
        Self::default()
    }

    /// Download from the ArduPilot terrain server.
    pub fn ardupilot_srtm1() -> Self {
        Self {
            source: TileSource::ArduPilotSrtm1,
            ..Default::default()
        }
    }

    /// Create a configuration with a custom URL template.
    ///
    /// Compression is auto-detected from the URL extension:
    /// - `.gz` → Gzip
    /// - `.zip` → ZIP
    /// - otherwise → None
    ///
    /// # Example
    ///
    /// ```
    /// use terramask::download::DownloadConfig;
    /// use terramask::TileFormat;
    ///
    /// let config = DownloadConfig::with_url_template(
    ///     "https://example.com/srtm/{lat_band}/{filename}.hgt.gz",
    /// )
    /// .with_format(TileFormat::Srtm3);
    /// ```
    pub fn with_url_template(url_template: impl Into<String>) -> Self {
        let template = url_template.into();
        let compression = Compression::from_url(&template);
        Self::with_url_template_and_compression(template, compression)
    }

    /// Create a configuration with explicit compression setting.
    pub fn with_url_template_and_compression(
        url_template: impl Into<String>,
        compression: Compression,
    ) -> Self {
        Self {
            source: TileSource::Custom {
                url_template: url_template.into(),
                compression,
            },
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the resolution served by the source.
    ///
    /// Only [`TileFormat::Srtm1`] and [`TileFormat::Srtm3`] are meaningful.
    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    fn compression(&self) -> Compression {
        match &self.source {
            TileSource::AwsSkadi => Compression::Gzip,
            TileSource::ArduPilotSrtm1 => Compression::Zip,
            TileSource::Custom { compression, .. } => *compression,
        }
    }
}

/// What happened to one tile during acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    Downloaded,
    /// Already present with the expected size.
    Skipped,
    Failed,
}

/// Progress report passed to the acquisition callback after each tile.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionProgress {
    pub key: TileKey,
    pub outcome: TileOutcome,
    /// Tiles handled so far, including this one.
    pub done: usize,
    pub total: usize,
}

/// Summary of an acquisition run.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Tiles that could not be fetched, in request order.
    pub failed_tiles: Vec<TileKey>,
}

impl AcquisitionReport {
    /// Total number of tiles handled.
    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

/// SRTM tile downloader.
pub struct Downloader {
    client: Client,
    config: DownloadConfig,
}

impl Downloader {
    /// Create a new downloader with the given configuration.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TerrainError::DownloadFailed {
                filename: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Ensure every tile covering a circle around `center` is present in
    /// `dest_dir`. See [`ensure_tiles`](Self::ensure_tiles).
    pub fn ensure_around<F>(
        &self,
        center: GeoPoint,
        radius_km: f64,
        dest_dir: &Path,
        progress: F,
    ) -> Result<AcquisitionReport>
    where
        F: FnMut(AcquisitionProgress),
    {
        self.ensure_tiles(tiles_covering(center, radius_km), dest_dir, progress)
    }

    /// Ensure each tile is present in `dest_dir`, downloading the missing ones
    /// sequentially.
    ///
    /// Per-tile failures are counted in the report and never abort the
    /// batch. Only failing to create `dest_dir` is returned as an error.
    pub fn ensure_tiles<I, F>(
        &self,
        tiles: I,
        dest_dir: &Path,
        mut progress: F,
    ) -> Result<AcquisitionReport>
    where
        I: IntoIterator<Item = TileKey>,
        F: FnMut(AcquisitionProgress),
    {
        fs::create_dir_all(dest_dir)?;

        let tiles: Vec<TileKey> = tiles.into_iter().collect();
        let total = tiles.len();
        let mut report = AcquisitionReport::default();

        for (i, key) in tiles.into_iter().enumerate() {
            let outcome = if self.is_present(key, dest_dir) {
                tracing::debug!(tile = %key, "Tile already present, skipping");
                report.skipped += 1;
                TileOutcome::Skipped
            } else {
                match self.download_tile(key, dest_dir) {
                    Ok(path) => {
                        tracing::debug!(tile = %key, path = %path.display(), "Tile downloaded");
                        report.downloaded += 1;
                        TileOutcome::Downloaded
                    }
                    Err(e) => {
                        tracing::warn!(tile = %key, error = %e, "Tile download failed");
                        report.failed += 1;
                        report.failed_tiles.push(key);
                        TileOutcome::Failed
                    }
                }
            };

            progress(AcquisitionProgress {
                key,
                outcome,
                done: i + 1,
                total,
            });
        }

        tracing::info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed,
            dest = %dest_dir.display(),
            "Tile acquisition finished"
        );
        Ok(report)
    }

    /// Local path of a tile inside `dest_dir`.
    pub fn tile_path(key: TileKey, dest_dir: &Path) -> PathBuf {
        dest_dir.join(coords_to_filename(key.lat, key.lon))
    }

    /// Whether the tile is on disk with the expected size.
    pub fn is_present(&self, key: TileKey, dest_dir: &Path) -> bool {
        fs::metadata(Self::tile_path(key, dest_dir))
            .map(|m| m.is_file() && m.len() == self.config.format.file_size() as u64)
            .unwrap_or(false)
    }

    /// Download one tile, replacing any existing file.
    ///
    /// The payload is decompressed into a temporary file next to the
    /// destination and only renamed into place once its size checks out.
    pub fn download_tile(&self, key: TileKey, dest_dir: &Path) -> Result<PathBuf> {
        let filename = coords_to_filename(key.lat, key.lon);
        let dest_path = dest_dir.join(&filename);
        let url = self.build_url(key)?;

        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(TerrainError::DownloadFailed {
                filename,
                reason: format!("HTTP {}", response.status()),
            });
        }

        let mut temp = NamedTempFile::new_in(dest_dir)?;
        let written = copy_decoded(response, self.config.compression(), temp.as_file_mut())
            .map_err(|e| TerrainError::DownloadFailed {
                filename: filename.clone(),
                reason: format!("Failed to decompress: {}", e),
            })?;

        let expected = self.config.format.file_size() as u64;
        if written != expected {
            return Err(TerrainError::DownloadFailed {
                filename,
                reason: format!("got {} bytes, expected {}", written, expected),
            });
        }

        temp.as_file().sync_all()?;
        temp.persist(&dest_path).map_err(|e| TerrainError::Io(e.error))?;
        Ok(dest_path)
    }

    /// Build the download URL for a tile.
    pub fn build_url(&self, key: TileKey) -> Result<String> {
        let filename = coords_to_filename(key.lat, key.lon);
        let base_name = filename.strip_suffix(".hgt").unwrap_or(&filename);

        match &self.config.source {
            TileSource::AwsSkadi => Ok(format!(
                "{}/{}/{}.hgt.gz",
                SKADI_BASE_URL,
                lat_band(key.lat),
                base_name
            )),
            TileSource::ArduPilotSrtm1 => Ok(format!(
                "https://terrain.ardupilot.org/SRTM1/{}.hgt.zip",
                base_name
            )),
            TileSource::Custom { url_template, .. } => {
                if url_template.is_empty() {
                    return Err(TerrainError::DownloadFailed {
                        filename,
                        reason: "No download URL template configured".to_string(),
                    });
                }

                Ok(url_template
                    .replace("{filename}", base_name)
                    .replace("{lat_band}", &lat_band(key.lat))
                    .replace("{lat_prefix}", &base_name[0..1])
                    .replace("{lat}", &base_name[1..3])
                    .replace("{lon_prefix}", &base_name[3..4])
                    .replace("{lon}", &base_name[4..7]))
            }
        }
    }
}

/// Decompress `reader` into `writer`, returning the number of bytes written.
fn copy_decoded<R: Read, W: Write>(
    mut reader: R,
    compression: Compression,
    writer: &mut W,
) -> io::Result<u64> {
    let written = match compression {
        Compression::None => io::copy(&mut reader, writer)?,
        Compression::Gzip => io::copy(&mut GzDecoder::new(reader), writer)?,
        Compression::Zip => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            let mut archive = ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let index = (0..archive.len())
                .find(|&i| {
                    archive
                        .by_index(i)
                        .map(|f| f.name().to_lowercase().ends_with(".hgt"))
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "no .hgt file in ZIP archive")
                })?;
            let mut entry = archive
                .by_index(index)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            io::copy(&mut entry, writer)?
        }
    };
    writer.flush()?;
    Ok(written)
}
