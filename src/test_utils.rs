//! In-memory fakes for the collector's and liveness loop's collaborators.

use crate::collector::{CollectionCycle, CycleOutcome};
use crate::core::{HealthProbe, SampleSink, SinkTarget, SizeSample};
use crate::error::SinkError;
use crate::settings::{merge, SettingsDocument, SettingsStore};
use crate::utils::sync::lock;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A settings store that never touches the filesystem.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    doc: Mutex<SettingsDocument>,
}

impl MemorySettingsStore {
    /// Creates a store from a JSON object literal. Non-objects start empty.
    pub fn from_json(value: Value) -> Self {
        let doc = match value {
            Value::Object(map) => map,
            _ => SettingsDocument::new(),
        };
        Self {
            doc: Mutex::new(doc),
        }
    }

    pub fn snapshot(&self) -> SettingsDocument {
        lock(&self.doc).clone()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<SettingsDocument> {
        Ok(self.snapshot())
    }

    async fn write(&self, patch: SettingsDocument) -> Result<SettingsDocument> {
        let mut doc = lock(&self.doc);
        merge(&mut doc, patch);
        Ok(doc.clone())
    }

    async fn remove(&self, keys: &[String]) -> Result<SettingsDocument> {
        let mut doc = lock(&self.doc);
        for key in keys {
            doc.remove(key);
        }
        Ok(doc.clone())
    }
}

/// A sink that records every batch it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<(SinkTarget, Vec<SizeSample>)>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records batches but rejects every write.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<(SinkTarget, Vec<SizeSample>)> {
        lock(&self.batches).clone()
    }
}

#[async_trait]
impl SampleSink for RecordingSink {
    async fn write(&self, target: &SinkTarget, samples: &[SizeSample]) -> Result<(), SinkError> {
        lock(&self.batches).push((target.clone(), samples.to_vec()));
        if self.fail {
            return Err(SinkError::Rejected {
                status: 500,
                body: "recording sink configured to fail".to_string(),
            });
        }
        Ok(())
    }
}

/// A probe whose answer per database is set by the test.
///
/// Unscripted databases fail as if unreachable.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    answers: Mutex<HashMap<String, Option<bool>>>,
    targets: Mutex<Vec<SinkTarget>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_online(&self, database: &str, has_data: bool) {
        lock(&self.answers).insert(database.to_string(), Some(has_data));
    }

    pub fn set_offline(&self, database: &str) {
        lock(&self.answers).insert(database.to_string(), None);
    }

    /// Every target probed so far, in call order.
    pub fn targets(&self) -> Vec<SinkTarget> {
        lock(&self.targets).clone()
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, target: &SinkTarget) -> Result<bool, SinkError> {
        lock(&self.targets).push(target.clone());
        let answer = lock(&self.answers).get(&target.database).copied().flatten();
        answer.ok_or_else(|| SinkError::InvalidResponse(format!("{} is unreachable", target.database)))
    }
}

/// A cycle that only counts how often it ran.
#[derive(Debug, Default)]
pub struct CountingCycle {
    runs: AtomicUsize,
    skip: bool,
}

impl CountingCycle {
    /// Every run reports two written samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run reports a skipped cycle.
    pub fn skipping() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectionCycle for CountingCycle {
    async fn run(&self) -> CycleOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.skip {
            CycleOutcome::Skipped {
                reason: "configuration incomplete".to_string(),
            }
        } else {
            CycleOutcome::Written { samples: 2 }
        }
    }
}
