//! Fakes for the port traits plus small builders shared by the test modules.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use time::{Date, Month, OffsetDateTime, UtcOffset};

use crate::ports::{
    Artifact, BoxFuture, ChartRenderer, ChartRequest, DispatchError, Dispatcher, FetchError,
    PrimaryFetch, RenderError, RepositoryError, ScheduleFeed, SubscriberRepository, TimeProvider,
};
use crate::types::schedule::{DayGrid, DaySchedule, RegionEntry, SlotStatus};
use crate::types::subscriber::{Subscriber, SubscriberId};

pub(crate) fn date(day: u8) -> Date {
    Date::from_calendar_date(2026, Month::January, day).expect("valid date")
}

/// 2026-01-`day` at `hour:minute`, UTC+02:00.
pub(crate) fn at(day: u8, hour: u8, minute: u8) -> OffsetDateTime {
    let offset = UtcOffset::from_hms(2, 0, 0).expect("valid offset");
    date(day)
        .with_hms(hour, minute, 0)
        .expect("valid time")
        .assume_offset(offset)
}

pub(crate) fn grid(slots: &[(usize, SlotStatus)]) -> DayGrid {
    let mut grid = DayGrid::unknown();
    for (index, status) in slots {
        grid.set(*index, *status);
    }
    grid
}

pub(crate) fn region(cpu: &str, queues: &[(&str, &[(Date, DayGrid)])]) -> RegionEntry {
    let schedule = queues
        .iter()
        .map(|(queue, days)| (queue.to_string(), days.iter().copied().collect::<DaySchedule>()))
        .collect();
    RegionEntry {
        cpu: cpu.to_string(),
        emergency: false,
        schedule,
    }
}

pub(crate) fn create_temp_root(test_name: &str) -> PathBuf {
    let mut root = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    root.push(format!("outage-watch-{}-{}", test_name, nanos));
    std::fs::create_dir_all(&root).expect("create temp dir");
    root
}

#[derive(Clone)]
pub(crate) struct TestClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl TestClock {
    pub(crate) fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub(crate) fn set(&self, now: OffsetDateTime) {
        *self.now.lock().expect("clock lock") = now;
    }
}

impl TimeProvider for TestClock {
    type Sleep<'a>
        = std::future::Ready<()>
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        *self.now.lock().expect("clock lock")
    }

    fn sleep<'a>(&'a self, _duration: Duration) -> Self::Sleep<'a> {
        std::future::ready(())
    }
}

/// Clock whose sleeps finish only after the test opens the gate, one permit
/// per sleep.
#[derive(Clone)]
pub(crate) struct GatedClock {
    clock: TestClock,
    gate: Arc<tokio::sync::Semaphore>,
    requested: Arc<Mutex<Vec<Duration>>>,
}

impl GatedClock {
    pub(crate) fn new(now: OffsetDateTime) -> Self {
        Self {
            clock: TestClock::new(now),
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn requested_sleeps(&self) -> Vec<Duration> {
        self.requested.lock().expect("sleeps lock").clone()
    }

    pub(crate) fn open(&self, sleeps: usize) {
        self.gate.add_permits(sleeps);
    }
}

impl TimeProvider for GatedClock {
    type Sleep<'a>
        = BoxFuture<'a, ()>
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        self.requested.lock().expect("sleeps lock").push(duration);
        Box::pin(async move {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        })
    }
}

#[derive(Default)]
struct FeedState {
    primary: Mutex<VecDeque<Result<PrimaryFetch, FetchError>>>,
    etags_seen: Mutex<Vec<Option<String>>>,
    primary_calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    secondary_enabled: Mutex<bool>,
    secondary_queues: Mutex<Option<Vec<String>>>,
    secondary: Mutex<BTreeMap<String, Result<DaySchedule, FetchError>>>,
    secondary_requests: Mutex<Vec<String>>,
}

/// Scripted feed: each primary fetch pops the next queued response.
#[derive(Clone, Default)]
pub(crate) struct FakeFeed {
    state: Arc<FeedState>,
}

impl FakeFeed {
    pub(crate) fn push_primary(&self, response: Result<PrimaryFetch, FetchError>) {
        self.state
            .primary
            .lock()
            .expect("feed lock")
            .push_back(response);
    }

    pub(crate) fn push_regions(&self, etag: Option<&str>, regions: Vec<RegionEntry>) {
        self.push_primary(Ok(PrimaryFetch::Modified {
            etag: etag.map(str::to_string),
            regions,
        }));
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().expect("feed lock") = Some(delay);
    }

    pub(crate) fn enable_secondary(&self, queues: Option<Vec<String>>) {
        *self.state.secondary_enabled.lock().expect("feed lock") = true;
        *self.state.secondary_queues.lock().expect("feed lock") = queues;
    }

    pub(crate) fn set_secondary(&self, queue: &str, response: Result<DaySchedule, FetchError>) {
        self.state
            .secondary
            .lock()
            .expect("feed lock")
            .insert(queue.to_string(), response);
    }

    pub(crate) fn primary_calls(&self) -> usize {
        self.state.primary_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn etags_seen(&self) -> Vec<Option<String>> {
        self.state.etags_seen.lock().expect("feed lock").clone()
    }

    pub(crate) fn secondary_requests(&self) -> Vec<String> {
        self.state
            .secondary_requests
            .lock()
            .expect("feed lock")
            .clone()
    }
}

impl ScheduleFeed for FakeFeed {
    fn fetch_primary<'a>(
        &'a self,
        etag: Option<&'a str>,
    ) -> BoxFuture<'a, Result<PrimaryFetch, FetchError>> {
        self.state.primary_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .etags_seen
            .lock()
            .expect("feed lock")
            .push(etag.map(str::to_string));
        let response = self
            .state
            .primary
            .lock()
            .expect("feed lock")
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("no scripted response".to_string())));
        let delay = *self.state.delay.lock().expect("feed lock");
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            response
        })
    }

    fn has_secondary(&self) -> bool {
        *self.state.secondary_enabled.lock().expect("feed lock")
    }

    fn fetch_secondary_queues(&self) -> BoxFuture<'_, Result<Vec<String>, FetchError>> {
        let queues = self.state.secondary_queues.lock().expect("feed lock").clone();
        Box::pin(async move { queues.ok_or(FetchError::Status(503)) })
    }

    fn fetch_secondary_schedule<'a>(
        &'a self,
        queue_id: &'a str,
    ) -> BoxFuture<'a, Result<DaySchedule, FetchError>> {
        self.state
            .secondary_requests
            .lock()
            .expect("feed lock")
            .push(queue_id.to_string());
        let response = self
            .state
            .secondary
            .lock()
            .expect("feed lock")
            .get(queue_id)
            .cloned()
            .unwrap_or_else(|| Ok(DaySchedule::new()));
        Box::pin(async move { response })
    }
}

#[derive(Clone, Default)]
pub(crate) struct MemoryRepository {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl MemoryRepository {
    pub(crate) fn with(subscribers: Vec<Subscriber>) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(subscribers)),
        }
    }

    pub(crate) fn get(&self, id: SubscriberId) -> Option<Subscriber> {
        self.subscribers
            .lock()
            .expect("repository lock")
            .iter()
            .find(|subscriber| subscriber.id == id)
            .cloned()
    }

    fn update(
        &self,
        id: SubscriberId,
        apply: impl FnOnce(&mut Subscriber),
    ) -> Result<(), RepositoryError> {
        let mut subscribers = self.subscribers.lock().expect("repository lock");
        let subscriber = subscribers
            .iter_mut()
            .find(|subscriber| subscriber.id == id)
            .ok_or(RepositoryError::NotFound(id))?;
        apply(subscriber);
        Ok(())
    }
}

impl SubscriberRepository for MemoryRepository {
    fn all_subscribers(&self) -> BoxFuture<'_, Result<Vec<Subscriber>, RepositoryError>> {
        let subscribers = self.subscribers.lock().expect("repository lock").clone();
        Box::pin(async move { Ok(subscribers) })
    }

    fn subscribers_by_region<'a>(
        &'a self,
        region_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Subscriber>, RepositoryError>> {
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .expect("repository lock")
            .iter()
            .filter(|subscriber| subscriber.region_id == region_id)
            .cloned()
            .collect();
        Box::pin(async move { Ok(subscribers) })
    }

    fn distinct_queues_in_region<'a>(
        &'a self,
        region_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, RepositoryError>> {
        let mut queues: Vec<String> = self
            .subscribers
            .lock()
            .expect("repository lock")
            .iter()
            .filter(|subscriber| subscriber.region_id == region_id)
            .flat_map(|subscriber| subscriber.queues.iter().map(|queue| queue.id.clone()))
            .collect();
        queues.sort();
        queues.dedup();
        Box::pin(async move { Ok(queues) })
    }

    fn upsert_subscriber(
        &self,
        subscriber: Subscriber,
    ) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let mut subscribers = self.subscribers.lock().expect("repository lock");
        subscribers.retain(|existing| existing.id != subscriber.id);
        subscribers.push(subscriber);
        Box::pin(async move { Ok(()) })
    }

    fn update_fingerprint<'a>(
        &'a self,
        id: SubscriberId,
        fingerprint: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        let result = self.update(id, |subscriber| {
            subscriber.last_schedule_fingerprint = Some(fingerprint.to_string());
        });
        Box::pin(async move { result })
    }

    fn update_last_reminder_event<'a>(
        &'a self,
        id: SubscriberId,
        event_id: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        let result = self.update(id, |subscriber| {
            subscriber.last_reminder_event_id = Some(event_id.to_string());
        });
        Box::pin(async move { result })
    }

    fn remove_subscriber(&self, id: SubscriberId) -> BoxFuture<'_, Result<(), RepositoryError>> {
        self.subscribers
            .lock()
            .expect("repository lock")
            .retain(|subscriber| subscriber.id != id);
        Box::pin(async move { Ok(()) })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Text(SubscriberId, String),
    Images(SubscriberId, usize, String),
}

#[derive(Clone, Default)]
pub(crate) struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<Sent>>>,
    unreachable: Arc<Mutex<Vec<SubscriberId>>>,
    failing: Arc<Mutex<Vec<SubscriberId>>>,
}

impl RecordingDispatcher {
    pub(crate) fn mark_unreachable(&self, id: SubscriberId) {
        self.unreachable.lock().expect("dispatcher lock").push(id);
    }

    pub(crate) fn mark_failing(&self, id: SubscriberId) {
        self.failing.lock().expect("dispatcher lock").push(id);
    }

    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("dispatcher lock").clone()
    }

    fn check(&self, id: SubscriberId) -> Result<(), DispatchError> {
        if self.unreachable.lock().expect("dispatcher lock").contains(&id) {
            return Err(DispatchError::Unreachable);
        }
        if self.failing.lock().expect("dispatcher lock").contains(&id) {
            return Err(DispatchError::Failed("scripted failure".to_string()));
        }
        Ok(())
    }
}

impl Dispatcher for RecordingDispatcher {
    fn send_text<'a>(
        &'a self,
        subscriber: SubscriberId,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        let result = self.check(subscriber).map(|()| {
            self.sent
                .lock()
                .expect("dispatcher lock")
                .push(Sent::Text(subscriber, text.to_string()));
        });
        Box::pin(async move { result })
    }

    fn send_images<'a>(
        &'a self,
        subscriber: SubscriberId,
        images: &'a [Artifact],
        caption: &'a str,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        let result = self.check(subscriber).map(|()| {
            self.sent
                .lock()
                .expect("dispatcher lock")
                .push(Sent::Images(subscriber, images.len(), caption.to_string()));
        });
        Box::pin(async move { result })
    }
}

/// Renders one tiny artifact per visible day and counts invocations.
#[derive(Clone, Default)]
pub(crate) struct CountingRenderer {
    calls: Arc<AtomicUsize>,
}

impl CountingRenderer {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChartRenderer for CountingRenderer {
    fn render(&self, request: &ChartRequest) -> Result<Vec<Artifact>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let days = if request.tomorrow.is_some() { 2 } else { 1 };
        Ok((0..days)
            .map(|index| Artifact {
                name: format!("{}-{index}.png", request.queue_label),
                content_type: "image/png",
                bytes: Arc::from(vec![index as u8]),
            })
            .collect())
    }
}
