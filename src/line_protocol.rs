//! Line-protocol serialization and the authenticated batch writer.
//!
//! Each sample becomes one line of the form
//! `directory_stats,folder=<tag> directory_size_bytes=<bytes> <timestamp>`.
//! A batch is written with a single POST; failures are classified and
//! returned, never retried here.

use crate::core::{SampleSink, SinkTarget, SizeSample};
use crate::error::SinkError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{error, info, instrument};

pub const MEASUREMENT: &str = "directory_stats";
pub const TAG_KEY: &str = "folder";
pub const FIELD_KEY: &str = "directory_size_bytes";
pub const WRITE_PATH: &str = "api/v3/write_lp";
pub const DEFAULT_PRECISION: &str = "nanosecond";

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

/// Encodes a single sample as one line, without a trailing newline.
pub fn encode_line(sample: &SizeSample) -> String {
    format!(
        "{},{}={} {}={} {}",
        escape_measurement(MEASUREMENT),
        escape_key(TAG_KEY),
        escape_key(sample.label.folder_tag()),
        escape_key(FIELD_KEY),
        sample.size_bytes,
        sample.timestamp_nanos
    )
}

/// Encodes a batch, one line per sample, joined by `\n` in input order.
pub fn encode_batch(samples: &[SizeSample]) -> String {
    samples.iter().map(encode_line).collect::<Vec<_>>().join("\n")
}

/// Escapes a measurement name (commas and spaces).
fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Escapes tag keys, tag values and field keys (commas, equals signs, spaces).
fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Writes sample batches to the sink's line-protocol endpoint.
#[derive(Debug, Clone)]
pub struct LineProtocolWriter {
    client: reqwest::Client,
    precision: String,
}

impl LineProtocolWriter {
    /// Creates a writer whose requests time out after `timeout`.
    pub fn new(timeout: Duration, precision: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            precision: precision.into(),
        })
    }
}

#[async_trait]
impl SampleSink for LineProtocolWriter {
    #[instrument(skip(self, target, samples), fields(database = %target.database, count = samples.len()))]
    async fn write(&self, target: &SinkTarget, samples: &[SizeSample]) -> Result<(), SinkError> {
        if samples.is_empty() {
            return Ok(());
        }

        let body = encode_batch(samples);
        let response = self
            .client
            .post(target.url(WRITE_PATH))
            .query(&[
                ("db", target.database.as_str()),
                ("precision", self.precision.as_str()),
            ])
            .bearer_auth(&target.token)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request to sink failed");
                metrics::counter!("sink_writes_total", "status" => "transport_error").increment(1);
                SinkError::Transport(e)
            })?;

        let status = response.status();
        if status.is_success() {
            info!("Data written successfully.");
            metrics::counter!("sink_writes_total", "status" => "ok").increment(1);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Sink rejected write");
            metrics::counter!("sink_writes_total", "status" => "rejected").increment(1);
            Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
