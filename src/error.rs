//! Error types for dsutil
//!
//! This module defines all error types used by the incrementer and the
//! GPU occupier, keeping the failing path and the underlying cause.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dsutil operations
#[derive(Error, Debug)]
pub enum DsUtilError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Expected a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// File name has no numeric stem
    #[error("Basename '{stem}' of '{path}' is not an integer")]
    NonNumericBasename { path: PathBuf, stem: String },

    /// Adding the offset does not fit in 64 bits
    #[error("Adding offset {offset} to {number} overflows")]
    OffsetOverflow { number: i64, offset: i64 },

    /// Source and target directories are the same
    #[error("Source and target directory are the same: {0}")]
    SameSourceAndTarget(PathBuf),

    /// Two inputs would be written to the same target
    #[error("'{first}' and '{second}' both map to '{target}'")]
    TargetCollision {
        first: PathBuf,
        second: PathBuf,
        target: PathBuf,
    },

    /// Target exists and overwriting is disabled
    #[error("Target already exists: {0}")]
    TargetExists(PathBuf),

    /// Image could not be read or decoded
    #[error("Cannot read image '{path}': {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Image could not be encoded or written
    #[error("Cannot write image '{path}': {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Written image does not decode to the same pixels
    #[error("Pixel mismatch between '{source_path}' and '{target_path}': {reason}")]
    PixelMismatch {
        source_path: PathBuf,
        target_path: PathBuf,
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Device reported an error
    #[error("Device {ordinal} error: {message}")]
    DeviceError { ordinal: usize, message: String },

    /// Not enough free device memory for the requested buffer
    #[error("Insufficient memory on device {ordinal}: need {required} bytes, have {available} bytes")]
    InsufficientDeviceMemory {
        ordinal: usize,
        required: u64,
        available: u64,
    },

    /// Unsupported operation in this build
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Report serialization error
    #[error("Report error: {0}")]
    ReportError(String),
}

impl DsUtilError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a device error
    pub fn device(ordinal: usize, message: impl Into<String>) -> Self {
        Self::DeviceError {
            ordinal,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for dsutil operations
pub type Result<T> = std::result::Result<T, DsUtilError>;

impl From<std::io::Error> for DsUtilError {
    fn from(err: std::io::Error) -> Self {
        DsUtilError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for DsUtilError {
    fn from(err: serde_json::Error) -> Self {
        DsUtilError::ReportError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| DsUtilError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_path_keeps_path_and_cause() {
        let err = std::fs::read("/nonexistent/dsutil/1.png")
            .with_path("/nonexistent/dsutil/1.png")
            .unwrap_err();

        match &err {
            DsUtilError::Io { path, source } => {
                assert_eq!(path, &PathBuf::from("/nonexistent/dsutil/1.png"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("/nonexistent/dsutil/1.png"));
    }

    #[test]
    fn test_non_numeric_message_names_file() {
        let err = DsUtilError::NonNumericBasename {
            path: PathBuf::from("test/frame_a.png"),
            stem: "frame_a".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Basename 'frame_a' of 'test/frame_a.png' is not an integer"
        );
    }

    #[test]
    fn test_insufficient_memory_message() {
        let err = DsUtilError::InsufficientDeviceMemory {
            ordinal: 1,
            required: 6_400_000_000,
            available: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("device 1"));
        assert!(msg.contains("6400000000"));
    }
}
