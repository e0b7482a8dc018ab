use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactCache, ArtifactKey};
use crate::ports::{
    Artifact, ChartRenderer, ChartRequest, DispatchError, Dispatcher, RenderError, ScheduleFeed,
    SubscriberRepository, TimeProvider,
};
use crate::relevance::is_relevant;
use crate::schedule::ScheduleStore;
use crate::schedule::fingerprint::{queue_fingerprint, subscriber_fingerprint};
use crate::types::schedule::ScheduleResult;
use crate::types::subscriber::{DisplayMode, QueueSubscription, Subscriber};

pub mod forecast;
pub(crate) mod tasks;

pub use tasks::{ScheduledTaskHandle, spawn_every};

const UPDATE_TEXT: &str = "Schedule updated";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub changed_regions: usize,
    pub notified: usize,
    pub silent: usize,
    pub removed: usize,
    pub failed: usize,
}

enum Outcome {
    Unchanged,
    Silent,
    Notified,
    Removed,
    Failed,
}

/// Refresh, change detection, relevance filtering and dispatch for every
/// subscriber of a region whose schedule moved.
pub struct NotificationCoordinator<F, T, R, D, C>
where
    F: ScheduleFeed,
    T: TimeProvider,
    R: SubscriberRepository,
    D: Dispatcher,
    C: ChartRenderer,
{
    store: Arc<ScheduleStore<F, T>>,
    artifacts: Arc<ArtifactCache>,
    repository: R,
    dispatcher: D,
    renderer: C,
}

impl<F, T, R, D, C> NotificationCoordinator<F, T, R, D, C>
where
    F: ScheduleFeed,
    T: TimeProvider,
    R: SubscriberRepository,
    D: Dispatcher,
    C: ChartRenderer,
{
    pub fn new(
        store: Arc<ScheduleStore<F, T>>,
        artifacts: Arc<ArtifactCache>,
        repository: R,
        dispatcher: D,
        renderer: C,
    ) -> Self {
        Self {
            store,
            artifacts,
            repository,
            dispatcher,
            renderer,
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        self.store.refresh().await;
        let changed = self.store.drain_changes(true);
        if changed.is_empty() {
            debug!("no schedule changes");
            return report;
        }
        report.changed_regions = changed.len();

        let now = self.store.time().now();
        for cpu in &changed {
            for region_id in self.store.regions().local_ids(cpu) {
                let dropped = self.artifacts.invalidate_region(&region_id);
                debug!(region = %region_id, dropped, "artifact cache invalidated");
                self.warm_region(&region_id, now).await;

                let subscribers = match self.repository.subscribers_by_region(&region_id).await {
                    Ok(subscribers) => subscribers,
                    Err(err) => {
                        warn!(region = %region_id, error = %err, "failed to load subscribers");
                        continue;
                    }
                };
                for subscriber in &subscribers {
                    match self.process(subscriber, now).await {
                        Outcome::Unchanged => {}
                        Outcome::Silent => report.silent += 1,
                        Outcome::Notified => report.notified += 1,
                        Outcome::Removed => report.removed += 1,
                        Outcome::Failed => report.failed += 1,
                    }
                }
            }
        }

        info!(
            regions = report.changed_regions,
            notified = report.notified,
            silent = report.silent,
            removed = report.removed,
            failed = report.failed,
            "notification cycle finished"
        );
        report
    }

    /// Renders the classic view of every queue subscribed in the region once,
    /// so subscribers sharing a queue are served from the cache.
    async fn warm_region(&self, region_id: &str, now: OffsetDateTime) {
        let queues = match self.repository.distinct_queues_in_region(region_id).await {
            Ok(queues) => queues,
            Err(err) => {
                warn!(region = %region_id, error = %err, "failed to list subscribed queues");
                return;
            }
        };
        for queue_id in queues {
            let Some(result) = self.store.cached_schedule(region_id, &queue_id) else {
                continue;
            };
            if let Err(err) = self.artifacts_for(&result, DisplayMode::Classic, now) {
                warn!(region = %region_id, queue = %queue_id, error = %err, "pre-render failed");
            }
        }
    }

    async fn process(&self, subscriber: &Subscriber, now: OffsetDateTime) -> Outcome {
        let results: Vec<(&QueueSubscription, ScheduleResult)> = subscriber
            .queues
            .iter()
            .filter_map(|queue| {
                self.store
                    .cached_schedule(&subscriber.region_id, &queue.id)
                    .map(|result| (queue, result))
            })
            .collect();
        if results.is_empty() {
            return Outcome::Unchanged;
        }

        let fingerprint = subscriber_fingerprint(results.iter().map(|(_, result)| result));
        if subscriber.last_schedule_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return Outcome::Unchanged;
        }

        let relevant = results.iter().any(|(queue, result)| {
            let previous = self.store.get_previous(&subscriber.region_id, &queue.id);
            is_relevant(previous.as_ref(), result, subscriber.display_mode, now)
        });
        if !relevant {
            debug!(subscriber = subscriber.id, "change outside the visible window");
            self.store_fingerprint(subscriber, &fingerprint).await;
            return Outcome::Silent;
        }

        match self.dispatch_schedule(subscriber, &results, now).await {
            Ok(()) => {
                self.store_fingerprint(subscriber, &fingerprint).await;
                Outcome::Notified
            }
            Err(DispatchError::Unreachable) => {
                info!(subscriber = subscriber.id, "removing unreachable subscriber");
                if let Err(err) = self.repository.remove_subscriber(subscriber.id).await {
                    warn!(subscriber = subscriber.id, error = %err, "failed to remove subscriber");
                }
                Outcome::Removed
            }
            Err(err) => {
                warn!(subscriber = subscriber.id, error = %err, "schedule dispatch failed");
                Outcome::Failed
            }
        }
    }

    async fn store_fingerprint(&self, subscriber: &Subscriber, fingerprint: &str) {
        if let Err(err) = self
            .repository
            .update_fingerprint(subscriber.id, fingerprint)
            .await
        {
            warn!(subscriber = subscriber.id, error = %err, "failed to store fingerprint");
        }
    }

    async fn dispatch_schedule(
        &self,
        subscriber: &Subscriber,
        results: &[(&QueueSubscription, ScheduleResult)],
        now: OffsetDateTime,
    ) -> Result<(), DispatchError> {
        self.dispatcher.send_text(subscriber.id, UPDATE_TEXT).await?;
        for (queue, result) in results {
            let artifacts = match self.artifacts_for(result, subscriber.display_mode, now) {
                Ok(artifacts) => artifacts,
                Err(err) => {
                    warn!(subscriber = subscriber.id, queue = %queue.id, error = %err, "chart rendering failed");
                    continue;
                }
            };
            let caption = forecast::caption(&queue.alias, result, now);
            self.dispatcher
                .send_images(subscriber.id, &artifacts, &caption)
                .await?;
        }
        Ok(())
    }

    fn artifacts_for(
        &self,
        result: &ScheduleResult,
        mode: DisplayMode,
        now: OffsetDateTime,
    ) -> Result<Arc<[Artifact]>, RenderError> {
        let fingerprint = queue_fingerprint(&result.queue_id, &result.schedule);
        let key = ArtifactKey::new(&result.region_id, &result.queue_id, mode, &fingerprint);
        if let Some(cached) = self.artifacts.get(&key) {
            return Ok(cached);
        }

        let rendered: Arc<[Artifact]> = self.renderer.render(&chart_request(result, mode, now))?.into();
        self.artifacts.set(key, Arc::clone(&rendered));
        Ok(rendered)
    }
}

fn chart_request(result: &ScheduleResult, mode: DisplayMode, now: OffsetDateTime) -> ChartRequest {
    let tomorrow = result.tomorrow();
    ChartRequest {
        queue_label: result.queue_id.clone(),
        mode,
        today: result.today(),
        tomorrow: (!mode.is_cacheable() || !tomorrow.is_empty()).then_some(tomorrow),
        marker: (!mode.is_cacheable()).then_some(now),
        emergency: result.emergency,
    }
}
