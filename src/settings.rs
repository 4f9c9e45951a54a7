//! The runtime settings document shared with the dashboard.
//!
//! Settings are a flat JSON object persisted to disk. Writes merge
//! shallowly into the existing document. A missing or unparsable file
//! reads as an empty document.

use crate::core::SinkTarget;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub type SettingsDocument = Map<String, Value>;

pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_TOKEN: &str = "token";
pub const KEY_DATA_PATH: &str = "dataPath";
pub const KEY_ACTIVE_RESOURCE: &str = "activeResource";

const LEGACY_ACTIVE_RESOURCE: &str = "activeBucket";

/// Keys written by earlier dashboard versions, checked after the current ones.
const LEGACY_KEYS: &[(&str, &str)] = &[
    (KEY_ENDPOINT, "influxEndpoint"),
    (KEY_TOKEN, "adminToken"),
    (KEY_ACTIVE_RESOURCE, LEGACY_ACTIVE_RESOURCE),
];

/// The typed view of the settings the collector and liveness loop need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub data_path: Option<PathBuf>,
    pub active_resource: Option<String>,
}

impl Settings {
    /// Extracts the known keys from a document. Empty strings count as unset.
    pub fn from_document(doc: &SettingsDocument) -> Self {
        Self {
            endpoint: lookup(doc, KEY_ENDPOINT),
            token: lookup(doc, KEY_TOKEN),
            data_path: lookup(doc, KEY_DATA_PATH).map(PathBuf::from),
            active_resource: lookup(doc, KEY_ACTIVE_RESOURCE),
        }
    }

    /// Builds the sink target for the active resource, or `default_resource`
    /// if none is selected.
    ///
    /// Returns the name of the first missing setting otherwise.
    pub fn sink_target(&self, default_resource: &str) -> Result<SinkTarget, &'static str> {
        let endpoint = self.endpoint.clone().ok_or(KEY_ENDPOINT)?;
        let token = self.token.clone().ok_or(KEY_TOKEN)?;
        let database = self
            .active_resource
            .clone()
            .unwrap_or_else(|| default_resource.to_string());
        Ok(SinkTarget {
            endpoint,
            token,
            database,
        })
    }
}

fn lookup(doc: &SettingsDocument, key: &str) -> Option<String> {
    let legacy = LEGACY_KEYS
        .iter()
        .find(|(current, _)| *current == key)
        .map(|(_, legacy)| *legacy);
    std::iter::once(key)
        .chain(legacy)
        .filter_map(|k| doc.get(k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// A patch recording the active resource. The legacy alias is always
/// cleared so a stale `activeBucket` cannot stand in for a cleared choice.
pub fn active_resource_patch(active: Option<&str>) -> SettingsDocument {
    let mut patch = SettingsDocument::new();
    patch.insert(
        KEY_ACTIVE_RESOURCE.to_string(),
        active.map_or(Value::Null, |name| Value::String(name.to_string())),
    );
    patch.insert(LEGACY_ACTIVE_RESOURCE.to_string(), Value::Null);
    patch
}

/// Shallow-merges `patch` into `doc`. `null` values remove the key.
pub fn merge(doc: &mut SettingsDocument, patch: SettingsDocument) {
    for (key, value) in patch {
        if value.is_null() {
            doc.remove(&key);
        } else {
            doc.insert(key, value);
        }
    }
}

/// Loads, merges and persists the settings document.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns the whole document.
    async fn load(&self) -> Result<SettingsDocument>;

    /// Merges `patch` shallowly, persists, and returns the new document.
    async fn write(&self, patch: SettingsDocument) -> Result<SettingsDocument>;

    /// Removes `keys`, persists, and returns the new document.
    async fn remove(&self, keys: &[String]) -> Result<SettingsDocument>;

    /// Returns the typed view of the document.
    async fn read(&self) -> Result<Settings> {
        Ok(Settings::from_document(&self.load().await?))
    }
}

/// A settings store backed by a pretty-printed JSON file.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_unlocked(&self) -> SettingsDocument {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to read settings file");
                }
                return SettingsDocument::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) => {
                warn!(path = %self.path.display(), "Settings file is not a JSON object, ignoring it");
                SettingsDocument::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings file is not valid JSON, ignoring it");
                SettingsDocument::new()
            }
        }
    }

    async fn persist(&self, doc: &SettingsDocument) -> Result<()> {
        let text = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Settings persisted");
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn load(&self) -> Result<SettingsDocument> {
        Ok(self.load_unlocked().await)
    }

    async fn write(&self, patch: SettingsDocument) -> Result<SettingsDocument> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_unlocked().await;
        merge(&mut doc, patch);
        self.persist(&doc).await?;
        Ok(doc)
    }

    async fn remove(&self, keys: &[String]) -> Result<SettingsDocument> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_unlocked().await;
        for key in keys {
            doc.remove(key);
        }
        self.persist(&doc).await?;
        Ok(doc)
    }
}
