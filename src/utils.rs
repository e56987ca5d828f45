//! General utility functions for skypelog
//!
//! This module contains common helper functions used across the library.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};

/// Timestamp format used in dump output (`2009-02-13.233130`)
pub const TIME_FORMAT: &str = "%Y-%m-%d.%H%M%S";

/// Format a file size in human-readable form (B, KB, MB, GB)
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// Format a Unix timestamp for dump output, in local time unless `utc`
pub fn format_timestamp(timestamp: i32, utc: bool) -> String {
    let Some(time) = DateTime::<Utc>::from_timestamp(i64::from(timestamp), 0) else {
        return timestamp.to_string();
    };
    if utc {
        time.format(TIME_FORMAT).to_string()
    } else {
        time.with_timezone(&Local).format(TIME_FORMAT).to_string()
    }
}

/// Create a glob matcher from a pattern string
///
/// Handles common patterns:
/// - `*.ext` becomes `**/*.ext` (match in any directory)
/// - Plain text without wildcards becomes `**/*text*` (substring search)
/// - Anything else is matched against the file name
pub fn create_glob_matcher(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if pattern.starts_with("*.") {
        format!("**/{}", pattern)
    } else if !pattern.contains('*') && !pattern.contains('?') {
        // Treat as substring search
        format!("**/*{}*", pattern)
    } else if !pattern.contains('/') {
        format!("**/{}", pattern)
    } else {
        pattern.to_string()
    };

    let glob = Glob::new(&pattern).with_context(|| format!("Invalid pattern: {}", pattern))?;
    Ok(glob.compile_matcher())
}

/// Check if a name matches the optional filter
pub fn matches_filter(name: &str, matcher: Option<&GlobMatcher>) -> bool {
    match matcher {
        Some(m) => m.is_match(name),
        None => true,
    }
}

/// Collect all files in a directory, sorted by path
pub fn collect_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = if recursive {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .collect()
    };
    files.sort();
    Ok(files)
}
