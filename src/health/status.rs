//! The per-resource status map and active-resource selection.

use crate::core::ResourceHealth;

/// One [`ResourceHealth`] per known resource, kept in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMap {
    entries: Vec<ResourceHealth>,
}

impl StatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map with every name in `unknown` state.
    pub fn with_resources<S: AsRef<str>>(names: &[S]) -> Self {
        let mut map = Self::new();
        map.set_resources(names);
        map
    }

    /// Replaces the resource set. Known names keep their last health and
    /// new names start `unknown`. Order follows `names`; duplicates are
    /// dropped.
    pub fn set_resources<S: AsRef<str>>(&mut self, names: &[S]) {
        let mut previous = std::mem::take(&mut self.entries);
        for name in names.iter().map(AsRef::as_ref) {
            if self.get(name).is_some() {
                continue;
            }
            let entry = match previous.iter().position(|e| e.name == name) {
                Some(index) => previous.swap_remove(index),
                None => ResourceHealth::unknown(name),
            };
            self.entries.push(entry);
        }
    }

    /// Records a probe result, appending the resource if it is new.
    ///
    /// Returns whether the stored entry changed.
    pub fn apply(&mut self, health: ResourceHealth) -> bool {
        match self.entries.iter_mut().find(|e| e.name == health.name) {
            Some(entry) if *entry == health => false,
            Some(entry) => {
                *entry = health;
                true
            }
            None => {
                self.entries.push(health);
                true
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ResourceHealth> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[ResourceHealth] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

/// Decides the active resource from the status map.
///
/// The current choice is kept while it stays online with data. Otherwise
/// the first eligible resource in discovery order wins, or none.
pub fn select_active(map: &StatusMap, current: Option<&str>) -> Option<String> {
    let still_eligible = current
        .and_then(|name| map.get(name))
        .filter(|health| health.is_eligible());
    if let Some(health) = still_eligible {
        return Some(health.name.clone());
    }
    map.entries()
        .iter()
        .find(|health| health.is_eligible())
        .map(|health| health.name.clone())
}
