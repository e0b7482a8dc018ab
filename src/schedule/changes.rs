use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

/// Remembers the last fingerprint per provider region key and collects the
/// keys whose fingerprint moved since the last draining read.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    inner: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    fingerprints: HashMap<String, String>,
    pending: BTreeSet<String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `fingerprint` for `cpu`; marks the region pending when it
    /// differs from the stored one. Returns whether it changed.
    pub fn record(&self, cpu: &str, fingerprint: String) -> bool {
        let mut state = self.inner.lock().expect("change tracker lock");
        if state.fingerprints.get(cpu) == Some(&fingerprint) {
            return false;
        }
        state.fingerprints.insert(cpu.to_string(), fingerprint);
        state.pending.insert(cpu.to_string());
        true
    }

    /// Current pending region keys. With `reset` the set is cleared in the
    /// same critical section; without it this is a peek.
    pub fn drain(&self, reset: bool) -> BTreeSet<String> {
        let mut state = self.inner.lock().expect("change tracker lock");
        if reset {
            std::mem::take(&mut state.pending)
        } else {
            state.pending.clone()
        }
    }

    pub fn fingerprint(&self, cpu: &str) -> Option<String> {
        let state = self.inner.lock().expect("change tracker lock");
        state.fingerprints.get(cpu).cloned()
    }
}
