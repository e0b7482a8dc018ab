use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use super::RegionMap;
use super::changes::ChangeTracker;
use super::fingerprint::region_fingerprint;
use super::merge::{fold_secondary, merge_regions};
use crate::ports::{FetchError, PrimaryFetch, ScheduleFeed, TimeProvider};
use crate::types::schedule::{DaySchedule, RegionEntry, ScheduleResult, ScheduleSnapshot, next_day};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub cache_ttl: Duration,
    /// Local id of the region refreshed from the secondary feed.
    pub designated_region: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            designated_region: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub date_today: Option<Date>,
    pub date_tomorrow: Option<Date>,
    pub region_count: usize,
    pub refreshed_at: Option<OffsetDateTime>,
    pub attempted_at: Option<OffsetDateTime>,
    pub has_validator: bool,
    pub has_previous: bool,
}

#[derive(Debug, Default)]
struct Snapshots {
    current: Option<Arc<ScheduleSnapshot>>,
    previous: Option<Arc<ScheduleSnapshot>>,
    etag: Option<String>,
    refreshed_at: Option<OffsetDateTime>,
    attempted_at: Option<OffsetDateTime>,
    /// Bumped by every finished refresh attempt; lets a caller that waited
    /// on the refresh lock see that someone else already refreshed.
    attempts: u64,
}

/// In-memory copy of the upstream dataset.
///
/// Readers take cheap `Arc` clones of the current snapshot under a short
/// read lock. A refresh builds the next snapshot off to the side and swaps it
/// in under the write lock together with the change-tracker update, so no
/// reader ever sees a half-merged region.
pub struct ScheduleStore<F, T>
where
    F: ScheduleFeed,
    T: TimeProvider,
{
    feed: F,
    time: T,
    regions: RegionMap,
    config: StoreConfig,
    snapshots: RwLock<Snapshots>,
    refresh_lock: tokio::sync::Mutex<()>,
    changes: ChangeTracker,
}

impl<F, T> ScheduleStore<F, T>
where
    F: ScheduleFeed,
    T: TimeProvider,
{
    pub fn new(feed: F, time: T, regions: RegionMap, config: StoreConfig) -> Self {
        Self {
            feed,
            time,
            regions,
            config,
            snapshots: RwLock::new(Snapshots::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            changes: ChangeTracker::new(),
        }
    }

    pub fn regions(&self) -> &RegionMap {
        &self.regions
    }

    pub fn time(&self) -> &T {
        &self.time
    }

    /// Schedule for one queue of a local region, refreshing first when the
    /// cache is stale. `None` means no data for that region/queue yet.
    pub async fn fetch_schedule(&self, region_id: &str, queue_id: &str) -> Option<ScheduleResult> {
        self.refresh_if_stale().await;
        self.cached_schedule(region_id, queue_id)
    }

    /// Lookup against the current snapshot without touching the network.
    /// Dates are pinned to the wall-clock day.
    pub fn cached_schedule(&self, region_id: &str, queue_id: &str) -> Option<ScheduleResult> {
        let snapshot = self.read().current.clone()?;
        let today = self.time.today();
        self.result_from(&snapshot, region_id, queue_id, today)
    }

    /// The same lookup against the snapshot that preceded the oldest change
    /// not yet drained from the tracker.
    pub fn get_previous(&self, region_id: &str, queue_id: &str) -> Option<ScheduleResult> {
        let snapshot = self.read().previous.clone()?;
        self.result_from(&snapshot, region_id, queue_id, snapshot.date_today)
    }

    /// Provider keys whose fingerprint changed since the last resetting drain.
    pub fn drain_changes(&self, reset: bool) -> std::collections::BTreeSet<String> {
        self.changes.drain(reset)
    }

    /// Local region ids that currently have schedule data for some queue.
    pub fn active_regions(&self) -> Vec<String> {
        let Some(snapshot) = self.read().current.clone() else {
            return Vec::new();
        };
        let mut ids: Vec<String> = snapshot
            .regions
            .iter()
            .filter(|region| region.schedule.values().any(|days| !days.is_empty()))
            .flat_map(|region| self.regions.local_ids(&region.cpu))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn snapshot_info(&self) -> SnapshotInfo {
        let snapshots = self.read();
        let today = self.time.today();
        let has_current = snapshots.current.is_some();
        SnapshotInfo {
            date_today: has_current.then_some(today),
            date_tomorrow: has_current.then(|| next_day(today)),
            region_count: snapshots
                .current
                .as_ref()
                .map_or(0, |snapshot| snapshot.regions.len()),
            refreshed_at: snapshots.refreshed_at,
            attempted_at: snapshots.attempted_at,
            has_validator: snapshots.etag.is_some(),
            has_previous: snapshots.previous.is_some(),
        }
    }

    /// Stale when nothing was attempted yet, the last attempt is older than
    /// the TTL, or the local date moved on since then.
    pub fn is_stale(&self) -> bool {
        let now = self.time.now();
        match self.read().attempted_at {
            None => true,
            Some(at) => {
                let age = now - at;
                age.is_negative() || age > self.config.cache_ttl || at.date() != now.date()
            }
        }
    }

    pub async fn refresh_if_stale(&self) {
        if self.is_stale() {
            self.refresh().await;
        }
    }

    /// One fetch cycle. Concurrent callers queue on the refresh lock; a caller
    /// that waited while another refresh finished returns without fetching
    /// again. Failures are logged and keep the last good snapshot.
    pub async fn refresh(&self) {
        let observed = self.read().attempts;
        let _guard = self.refresh_lock.lock().await;
        if self.read().attempts != observed {
            debug!("refresh already completed by a concurrent caller");
            return;
        }

        let today = self.time.today();
        let (current, etag) = {
            let snapshots = self.read();
            (snapshots.current.clone(), snapshots.etag.clone())
        };

        let fetched = self.feed.fetch_primary(etag.as_deref()).await;
        let (mut next, etag) = match fetched {
            Ok(PrimaryFetch::Modified { etag, mut regions }) => {
                if let Some(current) = &current {
                    merge_regions(&current.regions, &mut regions);
                }
                info!(regions = regions.len(), "primary feed updated");
                (ScheduleSnapshot::new(today, regions), etag)
            }
            Ok(PrimaryFetch::NotModified) => match &current {
                Some(current) => {
                    debug!("primary feed not modified");
                    let mut snapshot = ScheduleSnapshot::clone(current);
                    snapshot.sync_dates(today);
                    (snapshot, etag)
                }
                None => {
                    warn!("primary feed answered not-modified without a cached snapshot");
                    self.finish_failed(true);
                    return;
                }
            },
            Err(err) => {
                match &err {
                    FetchError::Malformed(_) => warn!(error = %err, "discarding primary payload"),
                    _ => warn!(error = %err, "primary feed fetch failed"),
                }
                self.finish_failed(false);
                return;
            }
        };

        next.prune_before(today.previous_day().unwrap_or(today));
        if self.feed.has_secondary() {
            self.fold_designated(&mut next).await;
        }

        let fingerprints: Vec<(String, String)> = next
            .regions
            .iter()
            .map(|region| (region.cpu.clone(), region_fingerprint(region)))
            .collect();
        let now = self.time.now();

        let mut snapshots = self.write();
        let had_pending = !self.changes.drain(false).is_empty();
        let mut changed = 0usize;
        for (cpu, fingerprint) in fingerprints {
            if self.changes.record(&cpu, fingerprint) {
                info!(region = %cpu, "region schedule changed");
                changed += 1;
            }
        }
        // Keep the baseline at the state before the oldest undrained change.
        if changed > 0 && !had_pending {
            snapshots.previous = snapshots.current.take();
        }
        snapshots.current = Some(Arc::new(next));
        snapshots.etag = etag;
        snapshots.refreshed_at = Some(now);
        snapshots.attempted_at = Some(now);
        snapshots.attempts += 1;
    }

    fn finish_failed(&self, clear_validator: bool) {
        let now = self.time.now();
        let mut snapshots = self.write();
        if clear_validator {
            snapshots.etag = None;
        }
        snapshots.attempted_at = Some(now);
        snapshots.attempts += 1;
    }

    async fn fold_designated(&self, snapshot: &mut ScheduleSnapshot) {
        let Some(designated) = &self.config.designated_region else {
            return;
        };
        let cpu = self.regions.provider_key(designated).to_string();
        let known: Vec<String> = snapshot
            .region(&cpu)
            .map(|region| region.schedule.keys().cloned().collect())
            .unwrap_or_default();

        let fetched = self.secondary_schedules(&known).await;
        if fetched.is_empty() {
            debug!(region = %cpu, "secondary feed returned no schedules");
            return;
        }

        if snapshot.region(&cpu).is_none() {
            snapshot.regions.push(RegionEntry {
                cpu: cpu.clone(),
                ..RegionEntry::default()
            });
        }
        if let Some(region) = snapshot.region_mut(&cpu) {
            debug!(region = %cpu, queues = fetched.len(), "folding secondary schedules");
            fold_secondary(region, fetched);
        }
    }

    async fn secondary_schedules(&self, known: &[String]) -> BTreeMap<String, DaySchedule> {
        let queues = match self.feed.fetch_secondary_queues().await {
            Ok(queues) if !queues.is_empty() => queues,
            Ok(_) => fallback_or(known),
            Err(err) => {
                debug!(error = %err, "secondary queue list unavailable");
                fallback_or(known)
            }
        };

        let mut fetched = BTreeMap::new();
        for queue_id in queues {
            match self.feed.fetch_secondary_schedule(&queue_id).await {
                Ok(days) if !days.is_empty() => {
                    fetched.insert(queue_id, days);
                }
                Ok(_) => {}
                Err(err) => warn!(queue = %queue_id, error = %err, "secondary fetch failed"),
            }
        }
        fetched
    }

    fn result_from(
        &self,
        snapshot: &ScheduleSnapshot,
        region_id: &str,
        queue_id: &str,
        today: Date,
    ) -> Option<ScheduleResult> {
        let cpu = self.regions.provider_key(region_id);
        let (region, schedule) = snapshot.lookup(cpu, queue_id)?;
        Some(ScheduleResult {
            region_id: region_id.to_string(),
            queue_id: queue_id.to_string(),
            date_today: today,
            date_tomorrow: next_day(today),
            schedule: schedule.clone(),
            emergency: region.emergency,
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshots> {
        self.snapshots.read().expect("snapshot lock")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshots> {
        self.snapshots.write().expect("snapshot lock")
    }
}

fn fallback_or(known: &[String]) -> Vec<String> {
    if known.is_empty() {
        fallback_queues()
    } else {
        known.to_vec()
    }
}

/// Queue codes 1.1 through 6.2.
pub(crate) fn fallback_queues() -> Vec<String> {
    (1..=6)
        .flat_map(|group| (1..=2).map(move |sub| format!("{group}.{sub}")))
        .collect()
}
