//! Zip extraction.
//!
//! # Platform Behavior
//!
//! **Unix**: permission bits stored in the archive are applied to extracted
//! files.
//!
//! **Windows**: modes are recorded in the report but not applied.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::options::{ExtractOptions, TraversalPolicy};
use crate::report::{ArchiveReport, ExtractedEntry, SkippedEntry};

/// Extract the zip archive at `archive` into `destination`.
pub fn extract_zip(
    archive: &Path,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ArchiveReport> {
    let file = File::open(archive).map_err(|e| Error::ExtractionFailed {
        path: archive.to_path_buf(),
        source: e,
    })?;
    extract_from_reader(BufReader::new(file), destination, options)
}

/// Extract a zip archive read from `reader` into `destination`.
///
/// Entries are processed in archive order. Every entry path is resolved
/// beneath `destination`; one that would escape it is handled according to
/// [`ExtractOptions::traversal`].
pub fn extract_from_reader<R: Read + Seek>(
    reader: R,
    destination: &Path,
    options: &ExtractOptions,
) -> Result<ArchiveReport> {
    let mut archive = ZipArchive::new(reader)?;
    ensure_directory(destination)?;

    let mut report = ArchiveReport::default();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_string();
        let is_directory = file.is_dir();

        let sanitized = match options.sanitize_path(&name, destination) {
            Ok(sanitized) => sanitized,
            // The stripped top-level directory itself.
            Err(Error::NoComponentsRemaining { .. }) if is_directory => continue,
            Err(e @ Error::PathTraversal { .. }) if options.traversal == TraversalPolicy::Skip => {
                warn!(entry = %name, "skipping entry outside destination");
                report.skipped.push(SkippedEntry {
                    original_path: name,
                    reason: e.to_string(),
                });
                continue;
            }
            Err(e) => return Err(e),
        };
        let target = sanitized.resolved;
        let mode = file.unix_mode();

        let size = if is_directory {
            ensure_directory(&target)?;
            0
        } else {
            let written = write_file(&mut file, &target)?;
            if let Some(mode) = mode {
                apply_mode(&target, mode)?;
            }
            written
        };
        debug!(entry = %name, bytes = size, "extracted");

        report.total_bytes += size;
        report.entries.push(ExtractedEntry {
            original_path: name,
            target_path: target,
            size,
            mode,
            is_directory,
        });
    }

    report.entry_count = report.entries.len();
    Ok(report)
}

fn write_file(reader: &mut impl Read, target: &Path) -> Result<u64> {
    if let Some(parent) = target.parent() {
        ensure_directory(parent)?;
    }

    let mut file = File::create(target).map_err(|e| Error::ExtractionFailed {
        path: target.to_path_buf(),
        source: e,
    })?;
    std::io::copy(reader, &mut file).map_err(|e| Error::ExtractionFailed {
        path: target.to_path_buf(),
        source: e,
    })
}

fn ensure_directory(path: &Path) -> Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path).map_err(|e| Error::DirectoryCreationFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o777))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
