//! Flat directory scanner
//!
//! Lists the regular files directly inside a set directory and turns
//! them into numbered image records. Subdirectories are not descended.

use crate::error::{DsUtilError, Result};
use crate::fs::naming::parse_numbered;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A plain file found in a set directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// An image file whose stem is an integer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Path to the file
    pub path: PathBuf,
    /// Numeric stem
    pub number: i64,
    /// Extension including the dot, or empty
    pub extension: String,
    /// Name of the parent directory
    pub category: Option<String>,
    /// File size in bytes
    pub size: u64,
}

impl ImageRecord {
    /// Parse a record from a scanned entry
    pub fn from_entry(entry: &FileEntry) -> Result<Self> {
        let (number, extension) = parse_numbered(&entry.path)?;

        let category = entry
            .path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());

        Ok(Self {
            path: entry.path.clone(),
            number,
            extension: extension.to_string(),
            category,
            size: entry.size,
        })
    }
}

/// Result of a directory scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Directory that was scanned
    pub root: PathBuf,
    /// Matching files, ordered by name
    pub files: Vec<FileEntry>,
    /// Subdirectories that were ignored
    pub dirs_skipped: usize,
    /// Total size of all files
    pub total_size: u64,
}

impl ScanResult {
    /// Parse every file into a record, sorted by number then path
    ///
    /// Fails on the first file whose stem is not an integer.
    pub fn records(&self) -> Result<Vec<ImageRecord>> {
        let mut records = self
            .files
            .iter()
            .map(ImageRecord::from_entry)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.path.cmp(&b.path)));
        Ok(records)
    }

    /// Highest numeric stem, ignoring files that are not numbered
    pub fn highest_number(&self) -> Option<i64> {
        self.files
            .iter()
            .filter_map(|entry| match ImageRecord::from_entry(entry) {
                Ok(record) => Some(record.number),
                Err(e) => {
                    warn!("Ignoring {}: {}", entry.path.display(), e);
                    None
                }
            })
            .max()
    }
}

/// Configuration for directory scanning
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Include hidden files
    pub include_hidden: bool,
    /// Include patterns
    pub include_patterns: Vec<String>,
    /// Exclude patterns
    pub exclude_patterns: Vec<String>,
}

/// Flat directory scanner
pub struct Scanner {
    config: ScanConfig,
    include_matcher: GlobSet,
    exclude_matcher: GlobSet,
}

impl Scanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Result<Self> {
        let include_matcher = Self::build_globset(&config.include_patterns)?;
        let exclude_matcher = Self::build_globset(&config.exclude_patterns)?;

        Ok(Self {
            config,
            include_matcher,
            exclude_matcher,
        })
    }

    /// Build a GlobSet from patterns
    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| DsUtilError::config(format!("Invalid glob pattern '{}': {}", pattern, e)))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| DsUtilError::config(format!("Failed to build glob set: {}", e)))
    }

    /// Scan the files directly inside `root`
    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        if !root.exists() {
            return Err(DsUtilError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(DsUtilError::NotADirectory(root.to_path_buf()));
        }

        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        let mut files = Vec::new();
        let mut dirs_skipped = 0;

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                match e.into_io_error() {
                    Some(io) => DsUtilError::io(path, io),
                    None => DsUtilError::io(path, std::io::Error::other("filesystem loop")),
                }
            })?;

            let name = entry.file_name().to_string_lossy();
            if !self.config.include_hidden && name.starts_with('.') {
                continue;
            }

            // Follows symlinks, so a link to an image counts as a file
            let metadata = std::fs::metadata(entry.path()).map_err(|e| DsUtilError::io(entry.path(), e))?;
            if metadata.is_dir() {
                debug!("Skipping directory {}", entry.path().display());
                dirs_skipped += 1;
                continue;
            }
            if !metadata.is_file() {
                continue;
            }

            if !self.include_matcher.is_empty() && !self.include_matcher.is_match(&*name) {
                continue;
            }
            if self.exclude_matcher.is_match(&*name) {
                continue;
            }

            files.push(FileEntry {
                path: entry.path().to_path_buf(),
                size: metadata.len(),
            });
        }

        let total_size = files.iter().map(|f| f.size).sum();

        Ok(ScanResult {
            root: root.to_path_buf(),
            files,
            dirs_skipped,
            total_size,
        })
    }
}
