//! Repository snapshot handling.
//!
//! A snapshot wraps the repository tree in one synthetic top-level directory
//! named after the commit (`owner-repo-abc123/`). The deploy root is that
//! directory, optionally joined with the descriptor's `subdir`.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use pipeline::RetryPolicy;
use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive could not be read: {0}")]
    Zip(#[from] ZipError),

    #[error("archive I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("archive has no top-level directory")]
    NoRoot,

    #[error("subdirectory {root} not found in archive")]
    SubdirNotFound { root: String },

    #[error("{root} contains no files")]
    EmptyRoot { root: String },

    #[error("archive entry {0} escapes the extraction directory")]
    UnsafeEntry(String),
}

impl ArchiveError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            // A truncated download or a full scratch disk can clear up.
            Self::Zip(_) | Self::Io(_) => RetryPolicy::retry(),
            Self::NoRoot
            | Self::SubdirNotFound { .. }
            | Self::EmptyRoot { .. }
            | Self::UnsafeEntry(_) => RetryPolicy::NonRetryable,
        }
    }
}

/// Lists entry names in central-directory order.
pub fn read_entries(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index_raw(i)?.name().to_string());
    }
    Ok(names)
}

/// The synthetic top-level directory, with its trailing slash.
pub fn synthetic_root(entries: &[String]) -> Result<String, ArchiveError> {
    let first = entries.first().ok_or(ArchiveError::NoRoot)?;
    match first.find('/') {
        Some(end) if end > 0 => Ok(first[..=end].to_string()),
        _ => Err(ArchiveError::NoRoot),
    }
}

/// Resolves the deploy root: the synthetic directory followed verbatim by
/// `subdir`. The result must be a directory: either a directory entry or the
/// parent of some entry. A root naming a file is not found.
pub fn resolve_root(entries: &[String], subdir: Option<&str>) -> Result<String, ArchiveError> {
    let root = format!("{}{}", synthetic_root(entries)?, subdir.unwrap_or_default());
    let as_dir = if root.ends_with('/') {
        root.clone()
    } else {
        format!("{root}/")
    };
    if entries.iter().any(|e| *e == as_dir || e.starts_with(&as_dir)) {
        Ok(root)
    } else {
        Err(ArchiveError::SubdirNotFound { root })
    }
}

/// Extracts the entries below `root` into `dest`, dropping the `root` prefix.
///
/// Returns the number of files written. A root with no files below it is an
/// error: mirroring an empty tree would empty the bucket.
pub fn extract_subtree(archive_path: &Path, root: &str, dest: &Path) -> Result<usize, ArchiveError> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;
    let root = PathBuf::from(root);
    fs::create_dir_all(dest)?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let enclosed = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        let relative = match enclosed.strip_prefix(&root) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative,
            _ => continue,
        };
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
        }
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        files += 1;
    }

    if files == 0 {
        return Err(ArchiveError::EmptyRoot {
            root: root.display().to_string(),
        });
    }
    debug!(files, root = %root.display(), "Extracted archive subtree");
    Ok(files)
}
