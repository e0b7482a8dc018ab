use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

mod changes;
pub mod fingerprint;
mod merge;
mod store;
pub(crate) mod wire;

pub use changes::ChangeTracker;
pub use store::{ScheduleStore, SnapshotInfo, StoreConfig};

#[derive(Debug, thiserror::Error)]
pub enum RegionMapError {
    #[error("failed to read region table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid region table: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Static table from local region ids to provider region keys. Several local
/// ids may share one provider key; ids missing from the table are their own
/// provider key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMap {
    provider_keys: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RegionTable {
    #[serde(default)]
    regions: BTreeMap<String, String>,
}

impl RegionMap {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            provider_keys: entries
                .into_iter()
                .map(|(local, provider)| (local.into(), provider.into()))
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, RegionMapError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, RegionMapError> {
        let table: RegionTable = toml::from_str(contents)?;
        Ok(Self {
            provider_keys: table
                .regions
                .into_iter()
                .map(|(local, provider)| (local.trim().to_string(), provider.trim().to_string()))
                .filter(|(local, provider)| !local.is_empty() && !provider.is_empty())
                .collect(),
        })
    }

    pub fn provider_key<'a>(&'a self, region_id: &'a str) -> &'a str {
        self.provider_keys
            .get(region_id)
            .map(String::as_str)
            .unwrap_or(region_id)
    }

    /// Every local region id served by provider key `cpu`.
    pub fn local_ids(&self, cpu: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .provider_keys
            .iter()
            .filter(|(_, provider)| provider.as_str() == cpu)
            .map(|(local, _)| local.clone())
            .collect();
        if !self.provider_keys.contains_key(cpu) && !ids.iter().any(|id| id == cpu) {
            ids.push(cpu.to_string());
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.provider_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provider_keys.is_empty()
    }
}
