//! Locates the active data directory among several on-disk layouts.
//!
//! Layouts are an ordered table of [`LayoutTemplate`]s evaluated uniformly:
//! the first template whose primary path exists on disk wins, and later
//! templates are never consulted. Adding a layout is a configuration change.

use crate::core::DirectoryLayout;
use crate::error::CollectorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Placeholder replaced by the resource name when a template is rendered.
pub const RESOURCE_PLACEHOLDER: &str = "{resource}";

/// Which side of a layout holds `<resource>-<digits>` generations that
/// must be narrowed down to the most recent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanTarget {
    /// Both paths are used as-is.
    #[default]
    None,
    /// The primary path is a parent of numbered generation directories.
    Primary,
    /// The archive path is a parent of numbered generation directories.
    Archive,
}

/// One candidate on-disk layout, relative to the configured data path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LayoutTemplate {
    /// Relative path of the primary storage, e.g. `"{resource}/dbs"`.
    pub primary: String,
    /// Relative path of the archive storage, if the layout has one.
    #[serde(default)]
    pub archive: Option<String>,
    /// Which path receives the numeric-suffix scan.
    #[serde(default)]
    pub scan: ScanTarget,
}

impl LayoutTemplate {
    pub fn new(primary: &str, archive: Option<&str>, scan: ScanTarget) -> Self {
        Self {
            primary: primary.to_string(),
            archive: archive.map(str::to_string),
            scan,
        }
    }

    /// The built-in layout table, in evaluation order.
    ///
    /// 1. `dbs` holds numbered generations directly under the data path, `c` is compacted storage.
    /// 2. The same pair nested under a per-resource directory.
    /// 3. A per-resource directory where `c` is live and `dbs` holds the numbered archives.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("dbs", Some("c"), ScanTarget::Primary),
            Self::new("{resource}/dbs", Some("{resource}/c"), ScanTarget::Primary),
            Self::new("{resource}/c", Some("{resource}/dbs"), ScanTarget::Archive),
        ]
    }

    fn render(template: &str, base: &Path, resource: &str) -> PathBuf {
        base.join(template.replace(RESOURCE_PLACEHOLDER, resource))
    }
}

/// Resolves a [`DirectoryLayout`] from an ordered template table.
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    templates: Vec<LayoutTemplate>,
}

impl Default for DirectoryResolver {
    fn default() -> Self {
        Self::new(LayoutTemplate::defaults())
    }
}

impl DirectoryResolver {
    pub fn new(templates: Vec<LayoutTemplate>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[LayoutTemplate] {
        &self.templates
    }

    /// Finds the directories to measure for `resource` under `base`.
    ///
    /// A missing base path, an unreadable directory, and a primary path with
    /// no matching generation are all reported as
    /// [`CollectorError::DiscoveryNotFound`].
    pub fn resolve(&self, base: &Path, resource: &str) -> Result<DirectoryLayout, CollectorError> {
        let not_found = |checked: Vec<PathBuf>| CollectorError::DiscoveryNotFound {
            resource: resource.to_string(),
            checked,
        };

        if !base.is_dir() {
            warn!(path = %base.display(), "Base path does not exist");
            return Err(not_found(vec![base.to_path_buf()]));
        }

        let mut checked = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let primary = LayoutTemplate::render(&template.primary, base, resource);
            if !primary.is_dir() {
                checked.push(primary);
                continue;
            }
            info!(path = %primary.display(), "Using layout");

            let data_directory = if template.scan == ScanTarget::Primary {
                match latest_generation(&primary, resource) {
                    Some(dir) => dir,
                    None => {
                        checked.push(primary);
                        return Err(not_found(checked));
                    }
                }
            } else {
                primary
            };

            let archive_directory = template
                .archive
                .as_deref()
                .map(|archive| LayoutTemplate::render(archive, base, resource))
                .filter(|archive| archive.is_dir())
                .and_then(|archive| {
                    if template.scan == ScanTarget::Archive {
                        latest_generation(&archive, resource)
                    } else {
                        Some(archive)
                    }
                });
            if archive_directory.is_none() {
                debug!(resource, "Layout has no archive directory on disk");
            }

            return Ok(DirectoryLayout {
                data_directory,
                archive_directory,
            });
        }

        Err(not_found(checked))
    }
}

/// Picks the `<resource>-<digits>` subdirectory with the largest suffix.
///
/// Suffixes are compared as numbers of arbitrary length, so `-10` beats
/// `-9`. Equal numbers (`-07` and `-7`) fall back to the name so the
/// choice stays stable across calls.
pub fn latest_generation(dir: &Path, resource: &str) -> Option<PathBuf> {
    let pattern = match Regex::new(&format!(r"^{}-(\d+)$", regex::escape(resource))) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!(resource, error = %e, "Failed to build generation pattern");
            return None;
        }
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to list generation directories");
            return None;
        }
    };

    let latest = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let digits = pattern.captures(&name)?.get(1)?.as_str();
            let significant = digits.trim_start_matches('0');
            Some(((significant.len(), significant.to_string()), name))
        })
        .max()
        .map(|(_, name)| dir.join(name));

    match &latest {
        Some(path) => debug!(path = %path.display(), "Found latest generation"),
        None => debug!(path = %dir.display(), resource, "No matching generation directory"),
    }
    latest
}
