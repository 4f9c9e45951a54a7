//! SQL existence/recency probe against the sink's query endpoint.

use crate::core::{HealthProbe, SinkTarget};
use crate::error::SinkError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

pub const QUERY_PATH: &str = "api/v3/query_sql";

#[derive(Serialize)]
struct QueryRequest<'a> {
    db: &'a str,
    q: &'a str,
}

/// Asks a database whether `measurement` received rows within `window`.
#[derive(Debug, Clone)]
pub struct SqlHealthProbe {
    client: reqwest::Client,
    query: String,
}

impl SqlHealthProbe {
    pub fn new(timeout: Duration, measurement: &str, window: &str) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            query: recent_rows_query(measurement, window),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Builds the `COUNT(*)` query used to decide whether a database has data.
pub fn recent_rows_query(measurement: &str, window: &str) -> String {
    format!(
        "SELECT COUNT(*) AS count FROM {measurement} WHERE time >= now() - INTERVAL '{}'",
        window.replace('\'', "''")
    )
}

/// Reads the `count` column of the first row; an empty result means no data.
fn has_rows(rows: &Value) -> Result<bool, SinkError> {
    let rows = rows
        .as_array()
        .ok_or_else(|| SinkError::InvalidResponse("expected a JSON array of rows".to_string()))?;
    let Some(first) = rows.first() else {
        return Ok(false);
    };
    let count = match first.get("count") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(count > 0.0)
}

#[async_trait]
impl HealthProbe for SqlHealthProbe {
    #[instrument(skip(self, target), fields(database = %target.database))]
    async fn probe(&self, target: &SinkTarget) -> Result<bool, SinkError> {
        let response = self
            .client
            .post(target.url(QUERY_PATH))
            .bearer_auth(&target.token)
            .json(&QueryRequest {
                db: &target.database,
                q: &self.query,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Value = response
            .json()
            .await
            .map_err(|e| SinkError::InvalidResponse(e.to_string()))?;
        let has_data = has_rows(&rows)?;
        debug!(has_data, "Health probe answered");
        Ok(has_data)
    }
}
