//! Core domain types and service traits for DataWatch
//!
//! This module defines the fundamental data structures and trait contracts
//! shared by the size collector and the liveness loop.

use crate::error::SinkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which on-disk location a size sample was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleLabel {
    /// Live storage (the `db_size` series).
    Primary,
    /// Compacted storage (the `compacted_size` series).
    Archive,
}

impl SampleLabel {
    /// The tag value written for this label.
    pub fn folder_tag(self) -> &'static str {
        match self {
            SampleLabel::Primary => "db_size",
            SampleLabel::Archive => "compacted_size",
        }
    }
}

/// A single directory size measurement, created fresh on every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeSample {
    pub label: SampleLabel,
    pub size_bytes: u64,
    /// Nanoseconds since the Unix epoch, shared by every sample in a batch.
    pub timestamp_nanos: i64,
}

impl SizeSample {
    pub fn new(label: SampleLabel, size_bytes: u64, timestamp_nanos: i64) -> Self {
        Self {
            label,
            size_bytes,
            timestamp_nanos,
        }
    }
}

/// The concrete directories resolved for one collection tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    /// Primary storage location.
    pub data_directory: PathBuf,
    /// Secondary, compacted storage location, if one exists on disk.
    pub archive_directory: Option<PathBuf>,
}

/// Health state of a polled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Online => "online",
            HealthStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// The last known health of one resource (bucket/database).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHealth {
    pub name: String,
    pub status: HealthStatus,
    /// Whether the resource currently yields queryable rows.
    pub has_data: bool,
}

impl ResourceHealth {
    /// A resource that has never been probed.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unknown,
            has_data: false,
        }
    }

    /// Fail-safe state for a resource whose probe did not succeed.
    pub fn offline(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Offline,
            has_data: false,
        }
    }

    pub fn online(name: impl Into<String>, has_data: bool) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Online,
            has_data,
        }
    }

    /// Whether this resource may serve as the active resource.
    pub fn is_eligible(&self) -> bool {
        self.status == HealthStatus::Online && self.has_data
    }
}

/// Where and how to reach the remote time-series sink for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    /// Base URL of the sink, with or without a trailing slash.
    pub endpoint: String,
    /// Bearer token sent with every request.
    pub token: String,
    /// The database (resource) the request addresses.
    pub database: String,
}

impl SinkTarget {
    /// Joins an API path onto the endpoint without doubling slashes.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Returns a copy addressing a different database.
    pub fn for_database(&self, database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..self.clone()
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Accepts batches of size samples for the remote sink.
#[async_trait]
pub trait SampleSink: Send + Sync {
    /// Writes the whole batch in a single request.
    ///
    /// # Returns
    /// * `Ok(())` if the sink acknowledged the write with a 2xx status
    /// * `Err(SinkError)` for transport failures or rejected writes
    async fn write(&self, target: &SinkTarget, samples: &[SizeSample]) -> Result<(), SinkError>;
}

/// Runs the lightweight existence/recency query used as a health probe.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes one database.
    ///
    /// # Returns
    /// * `Ok(true)` if the database answered and has recent rows
    /// * `Ok(false)` if it answered without recent rows
    /// * `Err` for transport or query failures
    async fn probe(&self, target: &SinkTarget) -> Result<bool, SinkError>;
}
