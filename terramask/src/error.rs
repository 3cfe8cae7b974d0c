//! Error types for the terramask library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while parsing tiles, building or loading caches,
/// and acquiring tiles.
///
/// Queries never fail: coordinates outside the loaded terrain (or a query
/// issued before any terrain was loaded) yield [`NO_DATA`](crate::NO_DATA).
#[derive(Error, Debug)]
pub enum TerrainError {
    /// IO error when reading or writing files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Byte count doesn't match the expected tile layout.
    #[error("Invalid file size: {size} bytes (expected {expected})")]
    InvalidFileSize { size: usize, expected: String },

    /// File extension or size doesn't identify a supported tile format.
    #[error("Unrecognized tile format: {path}")]
    UnrecognizedFormat { path: PathBuf },

    /// Cache file starts with an unknown magic string.
    #[error("Bad cache magic: {found:?}")]
    BadMagic { found: String },

    /// Cache header or body is inconsistent.
    #[error("Corrupt cache: {reason}")]
    CorruptCache { reason: String },

    /// No tiles were found below a source root.
    #[error("No elevation tiles found under {root}")]
    NoTiles { root: PathBuf },

    /// A caller-supplied parameter is outside its valid range.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A tile could not be downloaded.
    #[error("Failed to download {filename}: {reason}")]
    DownloadFailed { filename: String, reason: String },

    /// HTTP error during download.
    #[cfg(feature = "download")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TerrainError {
    /// Whether this error comes from malformed input rather than from the
    /// environment (file system, network).
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            TerrainError::InvalidFileSize { .. }
                | TerrainError::UnrecognizedFormat { .. }
                | TerrainError::BadMagic { .. }
                | TerrainError::CorruptCache { .. }
        )
    }
}

/// Result type alias using [`TerrainError`].
pub type Result<T> = std::result::Result<T, TerrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TerrainError::InvalidFileSize {
            size: 1000,
            expected: "2884802 or 25934402".to_string(),
        };
        assert!(err.to_string().contains("1000"));
        assert!(err.to_string().contains("2884802"));

        let err = TerrainError::BadMagic {
            found: "NOTACACH".to_string(),
        };
        assert!(err.to_string().contains("NOTACACH"));

        let err = TerrainError::UnrecognizedFormat {
            path: PathBuf::from("e027/n38.dt9"),
        };
        assert!(err.to_string().contains("n38.dt9"));

        let err = TerrainError::InvalidParameter {
            name: "num_azimuths",
            reason: "must be at least 1".to_string(),
        };
        assert!(err.to_string().contains("num_azimuths"));
    }

    #[test]
    fn test_format_error_classification() {
        assert!(TerrainError::BadMagic {
            found: String::new()
        }
        .is_format_error());
        assert!(TerrainError::CorruptCache {
            reason: "short".to_string()
        }
        .is_format_error());

        let io = TerrainError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_format_error());
        assert!(!TerrainError::NoTiles {
            root: PathBuf::from("/data")
        }
        .is_format_error());
    }
}
