//! One collection cycle: settings → discovery → size → write.

use crate::core::{SampleLabel, SampleSink, SizeSample};
use crate::discovery::DirectoryResolver;
use crate::error::CollectorError;
use crate::line_protocol::now_nanos;
use crate::settings::{SettingsStore, KEY_DATA_PATH};
use crate::size;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How a single cycle ended. Cycles never return errors to the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum CycleOutcome {
    /// The batch was acknowledged by the sink.
    Written { samples: usize },
    /// Nothing was measured: configuration incomplete or no directory found.
    Skipped { reason: String },
    /// Samples were measured but the write failed; the batch is dropped.
    Failed { reason: String },
}

impl CycleOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Written { .. } => "written",
            CycleOutcome::Skipped { .. } => "skipped",
            CycleOutcome::Failed { .. } => "failed",
        }
    }

    /// A short human-readable summary for control responses.
    pub fn describe(&self) -> String {
        match self {
            CycleOutcome::Written { samples } => format!("{samples} samples written"),
            CycleOutcome::Skipped { reason } => format!("collection skipped: {reason}"),
            CycleOutcome::Failed { reason } => format!("write failed: {reason}"),
        }
    }
}

/// A unit of work the supervisor runs on every tick.
#[async_trait]
pub trait CollectionCycle: Send + Sync {
    async fn run(&self) -> CycleOutcome;
}

/// Measures the resolved data directories and pushes them to the sink.
pub struct DirectorySizeCycle {
    settings: Arc<dyn SettingsStore>,
    resolver: DirectoryResolver,
    sink: Arc<dyn SampleSink>,
    default_resource: String,
}

impl DirectorySizeCycle {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        resolver: DirectoryResolver,
        sink: Arc<dyn SampleSink>,
        default_resource: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            resolver,
            sink,
            default_resource: default_resource.into(),
        }
    }

    /// Runs one cycle, returning the number of samples written.
    pub async fn collect(&self) -> Result<usize, CollectorError> {
        let settings = self
            .settings
            .read()
            .await
            .map_err(|e| CollectorError::Settings(e.to_string()))?;
        let target = settings
            .sink_target(&self.default_resource)
            .map_err(CollectorError::ConfigIncomplete)?;
        let base = settings
            .data_path
            .ok_or(CollectorError::ConfigIncomplete(KEY_DATA_PATH))?;

        let resolver = self.resolver.clone();
        let resource = target.database.clone();
        let (primary, archive) = tokio::task::spawn_blocking(move || {
            let layout = resolver.resolve(&base, &resource)?;
            debug!(path = %layout.data_directory.display(), "Calculating size for data directory");
            let primary = size::measure(&layout.data_directory);
            let archive = match &layout.archive_directory {
                Some(dir) => {
                    debug!(path = %dir.display(), "Calculating size for archive directory");
                    Some(size::measure(dir))
                }
                None => {
                    debug!("Skipping archive size calculation");
                    None
                }
            };
            Ok::<_, CollectorError>((primary, archive))
        })
        .await??;

        // One timestamp for the whole batch.
        let timestamp = now_nanos();
        let samples = vec![
            SizeSample::new(SampleLabel::Primary, primary.bytes, timestamp),
            SizeSample::new(
                SampleLabel::Archive,
                archive.map_or(0, |report| report.bytes),
                timestamp,
            ),
        ];
        for sample in &samples {
            metrics::gauge!("directory_size_bytes", "folder" => sample.label.folder_tag())
                .set(sample.size_bytes as f64);
        }

        self.sink.write(&target, &samples).await?;
        Ok(samples.len())
    }
}

#[async_trait]
impl CollectionCycle for DirectorySizeCycle {
    #[instrument(skip_all)]
    async fn run(&self) -> CycleOutcome {
        let outcome = match self.collect().await {
            Ok(samples) => {
                info!(samples, "Collection cycle complete");
                CycleOutcome::Written { samples }
            }
            Err(e) if e.is_skip() => {
                warn!(error = %e, "Skipping collection cycle");
                CycleOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "Collection cycle failed");
                CycleOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        metrics::counter!("collector_cycles_total", "outcome" => outcome.label()).increment(1);
        outcome
    }
}
