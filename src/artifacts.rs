use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ports::Artifact;
use crate::types::subscriber::DisplayMode;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub region_id: String,
    pub queue_id: String,
    pub mode: DisplayMode,
    pub fingerprint: String,
}

impl ArtifactKey {
    pub fn new(region_id: &str, queue_id: &str, mode: DisplayMode, fingerprint: &str) -> Self {
        Self {
            region_id: region_id.to_string(),
            queue_id: queue_id.to_string(),
            mode,
            fingerprint: fingerprint.to_string(),
        }
    }
}

/// Rendered charts keyed by content fingerprint. Only views without a live
/// time marker are stored; a dynamic view depends on the exact current time.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: Mutex<HashMap<ArtifactKey, Arc<[Artifact]>>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ArtifactKey) -> Option<Arc<[Artifact]>> {
        if !key.mode.is_cacheable() {
            return None;
        }
        self.lock().get(key).cloned()
    }

    /// Stores `artifacts` under `key`, replacing any earlier entry. Returns
    /// false when the mode is not cacheable and nothing was stored.
    pub fn set(&self, key: ArtifactKey, artifacts: impl Into<Arc<[Artifact]>>) -> bool {
        if !key.mode.is_cacheable() {
            return false;
        }
        self.lock().insert(key, artifacts.into());
        true
    }

    /// Drops every entry of `region_id`; returns how many were removed.
    pub fn invalidate_region(&self, region_id: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| key.region_id != region_id);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ArtifactKey, Arc<[Artifact]>>> {
        self.entries.lock().expect("artifact cache lock")
    }
}
