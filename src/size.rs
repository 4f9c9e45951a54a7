//! Recursive directory size computation.
//!
//! Storage trees are assumed to be acyclic. An entry that cannot be read
//! contributes zero bytes and is logged; its siblings are still counted.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// The result of measuring one directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeReport {
    /// Total bytes of every regular file found.
    pub bytes: u64,
    /// Number of entries that could not be read.
    pub errors: u64,
}

/// Sums the byte length of every regular file under `path`.
pub fn size_of(path: &Path) -> u64 {
    measure(path).bytes
}

/// Like [`size_of`], but also reports how many entries failed.
pub fn measure(path: &Path) -> SizeReport {
    let mut report = SizeReport::default();
    walk(path, &mut report);
    if report.errors > 0 {
        metrics::counter!("size_entry_errors_total").increment(report.errors);
    }
    debug!(path = %path.display(), bytes = report.bytes, errors = report.errors, "Measured directory");
    report
}

fn walk(dir: &Path, report: &mut SizeReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to read directory");
            report.errors += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to read directory entry");
                report.errors += 1;
                continue;
            }
        };
        let path = entry.path();
        // Follows symlinks, so a dangling link surfaces here as an error.
        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => walk(&path, report),
            Ok(meta) if meta.is_file() => report.bytes += meta.len(),
            Ok(_) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to stat entry, counting it as zero bytes");
                report.errors += 1;
            }
        }
    }
}
