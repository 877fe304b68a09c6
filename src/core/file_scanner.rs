//! Directory size aggregation for monitored paths
//!
//! The `FileScanner` walks each configured directory and sums file sizes and
//! counts. A directory that cannot be fully read yields an entry carrying the
//! error instead of a partial total, and never affects the other directories.
//!
//! # Examples
//!
//! ```no_run
//! use sheetmon::core::file_scanner::FileScanner;
//! use std::path::PathBuf;
//!
//! let scanner = FileScanner::new();
//! for stats in scanner.scan_all(&[PathBuf::from("/var/log")]) {
//!     println!("{:?}: {} files, {} bytes", stats.path, stats.file_count, stats.total_size_bytes);
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::sample::DirectoryStats;
use crate::error::MonitorError;

/// Walks directories and aggregates their contents
#[derive(Debug, Default, Clone, Copy)]
pub struct FileScanner;

#[derive(Debug, Default)]
struct Totals {
    size: u64,
    files: u64,
    dirs: u64,
}

impl FileScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan every path in order, one entry per path
    pub fn scan_all(&self, paths: &[PathBuf]) -> Vec<DirectoryStats> {
        paths.iter().map(|path| self.scan(path)).collect()
    }

    /// Scan a single directory tree
    pub fn scan(&self, path: &Path) -> DirectoryStats {
        match Self::scan_tree(path) {
            Ok(totals) => {
                log::debug!(
                    "Scanned {:?}: {} files, {} dirs, {} bytes",
                    path,
                    totals.files,
                    totals.dirs,
                    totals.size
                );
                DirectoryStats {
                    path: path.to_path_buf(),
                    total_size_bytes: totals.size,
                    file_count: totals.files,
                    dir_count: totals.dirs,
                    error: None,
                }
            }
            Err(e) => {
                log::warn!("{}", e);
                DirectoryStats::failed(path.to_path_buf(), e.to_string())
            }
        }
    }

    fn scan_tree(root: &Path) -> Result<Totals, MonitorError> {
        let metadata = fs::metadata(root).map_err(|e| MonitorError::directory_scan(root, e))?;
        if !metadata.is_dir() {
            return Err(MonitorError::directory_scan(
                root,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let mut totals = Totals::default();
        walk(root, &mut totals)?;
        Ok(totals)
    }
}

/// Sum a subtree without following symlinks. Any error aborts the whole walk.
fn walk(dir: &Path, totals: &mut Totals) -> Result<(), MonitorError> {
    let entries = fs::read_dir(dir).map_err(|e| MonitorError::directory_scan(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| MonitorError::directory_scan(dir, e))?;
        let path = entry.path();
        let metadata = fs::symlink_metadata(&path)
            .map_err(|e| MonitorError::directory_scan(&path, e))?;
        let file_type = metadata.file_type();

        if file_type.is_dir() {
            totals.dirs += 1;
            walk(&path, totals)?;
        } else if file_type.is_file() {
            totals.files += 1;
            totals.size += metadata.len();
        }
    }

    Ok(())
}
