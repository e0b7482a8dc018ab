use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;

use crate::notify::ScheduledTaskHandle;
use crate::ports::{BoxFuture, ScheduleFeed, TimeProvider};
use crate::schedule::{ScheduleStore, SnapshotInfo};
use crate::types::schedule::ScheduleResult;

/// Read side of the schedule store as seen by HTTP handlers.
pub trait ScheduleView: Send + Sync + 'static {
    fn schedule<'a>(
        &'a self,
        region_id: &'a str,
        queue_id: &'a str,
    ) -> BoxFuture<'a, Option<ScheduleResult>>;
    fn active_regions(&self) -> Vec<String>;
    fn pending_changes(&self) -> BTreeSet<String>;
    fn snapshot_info(&self) -> SnapshotInfo;
    fn now(&self) -> OffsetDateTime;
}

impl<F, T> ScheduleView for ScheduleStore<F, T>
where
    F: ScheduleFeed,
    T: TimeProvider,
{
    fn schedule<'a>(
        &'a self,
        region_id: &'a str,
        queue_id: &'a str,
    ) -> BoxFuture<'a, Option<ScheduleResult>> {
        Box::pin(self.fetch_schedule(region_id, queue_id))
    }

    fn active_regions(&self) -> Vec<String> {
        ScheduleStore::active_regions(self)
    }

    fn pending_changes(&self) -> BTreeSet<String> {
        self.drain_changes(false)
    }

    fn snapshot_info(&self) -> SnapshotInfo {
        ScheduleStore::snapshot_info(self)
    }

    fn now(&self) -> OffsetDateTime {
        self.time().now()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub schedule: Arc<dyn ScheduleView>,
    pub tasks: Arc<Mutex<Vec<ScheduledTaskHandle>>>,
}
