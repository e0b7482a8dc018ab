use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::ports;

/// A job running on a fixed cadence in its own tokio task.
pub struct ScheduledTaskHandle {
    pub name: &'static str,
    pub interval: Duration,
    pub started_at: OffsetDateTime,
    runs: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl ScheduledTaskHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Completed runs so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.handle.await
    }
}

/// Runs `job` right away and then again `interval` after each run finished.
pub fn spawn_every<T, J, Fut>(
    time: T,
    name: &'static str,
    interval: Duration,
    job: J,
) -> ScheduledTaskHandle
where
    T: ports::TimeProvider,
    J: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let started_at = time.now();
    let runs = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&runs);
    let handle = tokio::spawn(async move {
        run_every(time, name, interval, job, counter).await;
    });
    ScheduledTaskHandle {
        name,
        interval,
        started_at,
        runs,
        handle,
    }
}

async fn run_every<T, J, Fut>(
    time: T,
    name: &'static str,
    interval: Duration,
    mut job: J,
    runs: Arc<AtomicU64>,
) where
    T: ports::TimeProvider,
    J: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        job().await;
        let completed = runs.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(task = name, runs = completed, "scheduled run finished");
        time.sleep(interval).await;
    }
}
