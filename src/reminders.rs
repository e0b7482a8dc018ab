//! Advance warnings about the next outage block of each subscriber.

use std::sync::Arc;

use time::{OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{debug, info, warn};

use crate::ports::{DispatchError, Dispatcher, ScheduleFeed, SubscriberRepository, TimeProvider};
use crate::schedule::ScheduleStore;
use crate::types::schedule::{SLOTS_PER_DAY, ScheduleResult, SlotStatus, slot_index};
use crate::types::subscriber::{QueueSubscription, Subscriber};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub checked: usize,
    pub sent: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UpcomingOutage {
    start: OffsetDateTime,
    queues: Vec<QueueSubscription>,
}

enum Outcome {
    Idle,
    Sent,
    Removed,
}

pub struct ReminderEngine<F, T, R, D>
where
    F: ScheduleFeed,
    T: TimeProvider,
    R: SubscriberRepository,
    D: Dispatcher,
{
    store: Arc<ScheduleStore<F, T>>,
    repository: R,
    dispatcher: D,
}

impl<F, T, R, D> ReminderEngine<F, T, R, D>
where
    F: ScheduleFeed,
    T: TimeProvider,
    R: SubscriberRepository,
    D: Dispatcher,
{
    pub fn new(store: Arc<ScheduleStore<F, T>>, repository: R, dispatcher: D) -> Self {
        Self {
            store,
            repository,
            dispatcher,
        }
    }

    /// One pass over every subscriber with reminders enabled.
    pub async fn run_once(&self) -> ReminderReport {
        let mut report = ReminderReport::default();
        let subscribers = match self.repository.all_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(err) => {
                warn!(error = %err, "failed to load subscribers for reminders");
                return report;
            }
        };

        let now = self.store.time().now();
        for subscriber in subscribers.iter().filter(|s| s.reminder_minutes > 0) {
            report.checked += 1;
            match self.remind(subscriber, now).await {
                Outcome::Sent => report.sent += 1,
                Outcome::Removed => report.removed += 1,
                Outcome::Idle => {}
            }
        }
        if report.sent > 0 || report.removed > 0 {
            info!(
                sent = report.sent,
                removed = report.removed,
                "reminder pass finished"
            );
        }
        report
    }

    async fn remind(&self, subscriber: &Subscriber, now: OffsetDateTime) -> Outcome {
        let mut upcoming: Option<UpcomingOutage> = None;
        for queue in &subscriber.queues {
            let Some(result) = self
                .store
                .fetch_schedule(&subscriber.region_id, &queue.id)
                .await
            else {
                continue;
            };
            let Some(start) = next_block_start(&result, now) else {
                continue;
            };
            match upcoming.as_mut() {
                Some(earliest) if earliest.start == start => earliest.queues.push(queue.clone()),
                Some(earliest) if earliest.start < start => {}
                _ => {
                    upcoming = Some(UpcomingOutage {
                        start,
                        queues: vec![queue.clone()],
                    })
                }
            }
        }
        let Some(upcoming) = upcoming else {
            return Outcome::Idle;
        };

        let lead = upcoming.start - now;
        if !lead.is_positive() || lead > time::Duration::minutes(i64::from(subscriber.reminder_minutes)) {
            return Outcome::Idle;
        }

        let queue_ids: Vec<&str> = upcoming.queues.iter().map(|queue| queue.id.as_str()).collect();
        let event = event_id(&queue_ids, upcoming.start);
        if subscriber.last_reminder_event_id.as_deref() == Some(event.as_str()) {
            return Outcome::Idle;
        }

        let text = reminder_text(&upcoming, lead.whole_minutes());
        match self.dispatcher.send_text(subscriber.id, &text).await {
            Ok(()) => {
                debug!(subscriber = subscriber.id, event = %event, "reminder sent");
                if let Err(err) = self
                    .repository
                    .update_last_reminder_event(subscriber.id, &event)
                    .await
                {
                    warn!(subscriber = subscriber.id, error = %err, "failed to store reminder event");
                }
                Outcome::Sent
            }
            Err(DispatchError::Unreachable) => {
                info!(subscriber = subscriber.id, "removing unreachable subscriber");
                if let Err(err) = self.repository.remove_subscriber(subscriber.id).await {
                    warn!(subscriber = subscriber.id, error = %err, "failed to remove subscriber");
                }
                Outcome::Removed
            }
            Err(err) => {
                warn!(subscriber = subscriber.id, error = %err, "reminder dispatch failed");
                Outcome::Idle
            }
        }
    }
}

/// Start of the first outage block beginning after the slot covering `now`,
/// looking across today and tomorrow. A slot starts a block when it is off
/// and its predecessor is not; a block already under way is never returned.
pub fn next_block_start(result: &ScheduleResult, now: OffsetDateTime) -> Option<OffsetDateTime> {
    let today = result.today();
    let tomorrow = result.tomorrow();
    let slots: Vec<SlotStatus> = today
        .slots()
        .iter()
        .chain(tomorrow.slots().iter())
        .copied()
        .collect();

    let current = slot_index(now.hour(), now.minute());
    let index = (current + 1..slots.len())
        .find(|&index| slots[index] == SlotStatus::Off && slots[index - 1] != SlotStatus::Off)?;

    let date = if index < SLOTS_PER_DAY {
        result.date_today
    } else {
        result.date_tomorrow
    };
    let slot = index % SLOTS_PER_DAY;
    let start = Time::from_hms((slot / 2) as u8, ((slot % 2) * 30) as u8, 0).ok()?;
    Some(PrimitiveDateTime::new(date, start).assume_offset(now.offset()))
}

/// Deterministic id of one outage occurrence, e.g. `4+5.2_202601281000`.
pub fn event_id(queue_ids: &[&str], start: OffsetDateTime) -> String {
    format!(
        "{}_{:04}{:02}{:02}{:02}{:02}",
        queue_ids.join("+"),
        start.year(),
        u8::from(start.month()),
        start.day(),
        start.hour(),
        start.minute()
    )
}

fn reminder_text(upcoming: &UpcomingOutage, minutes: i64) -> String {
    let labels: Vec<&str> = upcoming
        .queues
        .iter()
        .map(|queue| queue.alias.as_str())
        .collect();
    format!(
        "Power outage for {} starts at {:02}:{:02} (in {} min)",
        labels.join(", "),
        upcoming.start.hour(),
        upcoming.start.minute(),
        minutes
    )
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::schedule::{RegionMap, StoreConfig};
    use crate::test_support::{
        FakeFeed, MemoryRepository, RecordingDispatcher, Sent, TestClock, at, date, grid, region,
    };
    use crate::types::schedule::{DayGrid, DaySchedule, RegionEntry};

    type Engine = ReminderEngine<FakeFeed, TestClock, MemoryRepository, RecordingDispatcher>;

    fn harness(
        regions: Vec<RegionEntry>,
        subscribers: Vec<Subscriber>,
        clock: &TestClock,
    ) -> (Engine, MemoryRepository, RecordingDispatcher) {
        let feed = FakeFeed::default();
        feed.push_regions(None, regions);
        let store = Arc::new(ScheduleStore::new(
            feed,
            clock.clone(),
            RegionMap::default(),
            StoreConfig::default(),
        ));
        let repository = MemoryRepository::with(subscribers);
        let dispatcher = RecordingDispatcher::default();
        (
            ReminderEngine::new(store, repository.clone(), dispatcher.clone()),
            repository,
            dispatcher,
        )
    }

    fn subscriber(id: i64, queues: &[&str], minutes: u32) -> Subscriber {
        let mut subscriber = Subscriber::new(
            id,
            "kyiv",
            queues.iter().map(|queue| QueueSubscription::new(*queue)).collect(),
        );
        subscriber.reminder_minutes = minutes;
        subscriber
    }

    fn result(today: DayGrid, tomorrow: DayGrid) -> ScheduleResult {
        ScheduleResult {
            region_id: "kyiv".to_string(),
            queue_id: "1.1".to_string(),
            date_today: date(28),
            date_tomorrow: date(29),
            schedule: DaySchedule::from([(date(28), today), (date(29), tomorrow)]),
            emergency: false,
        }
    }

    #[test]
    fn next_block_start__should_skip_block_already_in_progress() {
        // Given
        let today = grid(&[
            (19, SlotStatus::Off),
            (20, SlotStatus::Off),
            (21, SlotStatus::Off),
            (24, SlotStatus::Off),
        ]);

        // When
        let start = next_block_start(&result(today, DayGrid::unknown()), at(28, 10, 15));

        // Then
        assert_eq!(start, Some(at(28, 12, 0)));
    }

    #[test]
    fn next_block_start__should_continue_into_tomorrow() {
        // Given
        let tomorrow = grid(&[(0, SlotStatus::Off), (1, SlotStatus::Off)]);

        // When
        let start = next_block_start(&result(DayGrid::unknown(), tomorrow), at(28, 23, 50));

        // Then
        assert_eq!(start, Some(at(29, 0, 0)));
    }

    #[test]
    fn next_block_start__should_not_split_block_across_midnight() {
        // Given
        let today = grid(&[(47, SlotStatus::Off)]);
        let tomorrow = grid(&[(0, SlotStatus::Off), (6, SlotStatus::Off)]);

        // When
        let start = next_block_start(&result(today, tomorrow), at(28, 23, 40));

        // Then
        assert_eq!(start, Some(at(29, 3, 0)));
    }

    #[test]
    fn next_block_start__should_ignore_block_starting_in_current_slot() {
        // Given
        let today = grid(&[(20, SlotStatus::Off), (21, SlotStatus::Off)]);

        // Then
        assert_eq!(next_block_start(&result(today, DayGrid::unknown()), at(28, 10, 0)), None);
        assert_eq!(next_block_start(&result(today, DayGrid::unknown()), at(28, 10, 15)), None);
        assert_eq!(
            next_block_start(&result(today, DayGrid::unknown()), at(28, 9, 59)),
            Some(at(28, 10, 0))
        );
    }

    #[test]
    fn event_id__should_join_queues_and_start_minute() {
        assert_eq!(event_id(&["4", "5.2"], at(28, 10, 0)), "4+5.2_202601281000");
        assert_eq!(event_id(&["1.1"], at(9, 7, 30)), "1.1_202601090730");
    }

    #[tokio::test]
    async fn run_once__should_remind_once_per_block() {
        // Given
        let clock = TestClock::new(at(28, 9, 50));
        let day = grid(&[(20, SlotStatus::Off), (21, SlotStatus::Off), (30, SlotStatus::Off)]);
        let (engine, repository, dispatcher) = harness(
            vec![region("kyiv", &[("1.1", &[(date(28), day)])])],
            vec![subscriber(1, &["1.1"], 15)],
            &clock,
        );

        // When
        let first = engine.run_once().await;
        clock.set(at(28, 9, 55));
        let repeat = engine.run_once().await;

        // Then
        assert_eq!(first.sent, 1);
        assert_eq!(repeat.sent, 0);
        assert_eq!(dispatcher.sent().len(), 1);
        assert_eq!(
            repository.get(1).and_then(|s| s.last_reminder_event_id),
            Some("1.1_202601281000".to_string())
        );

        // When
        clock.set(at(28, 14, 50));
        let later = engine.run_once().await;

        // Then
        assert_eq!(later.sent, 1);
        assert_eq!(
            repository.get(1).and_then(|s| s.last_reminder_event_id),
            Some("1.1_202601281500".to_string())
        );
    }

    #[tokio::test]
    async fn run_once__should_wait_until_block_is_within_lead_time() {
        // Given
        let clock = TestClock::new(at(28, 9, 30));
        let day = grid(&[(20, SlotStatus::Off)]);
        let (engine, _repository, dispatcher) = harness(
            vec![region("kyiv", &[("1.1", &[(date(28), day)])])],
            vec![subscriber(1, &["1.1"], 15), subscriber(2, &["1.1"], 0)],
            &clock,
        );

        // When
        let report = engine.run_once().await;

        // Then
        assert_eq!(report.checked, 1);
        assert_eq!(report.sent, 0);
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn run_once__should_group_queues_sharing_the_earliest_start() {
        // Given
        let clock = TestClock::new(at(28, 9, 50));
        let shared = grid(&[(20, SlotStatus::Off)]);
        let (engine, repository, dispatcher) = harness(
            vec![region(
                "kyiv",
                &[
                    ("4", &[(date(28), shared)]),
                    ("5.2", &[(date(28), shared)]),
                    ("6", &[(date(28), grid(&[(22, SlotStatus::Off)]))]),
                ],
            )],
            vec![subscriber(1, &["4", "5.2", "6"], 30)],
            &clock,
        );

        // When
        engine.run_once().await;

        // Then
        assert_eq!(
            repository.get(1).and_then(|s| s.last_reminder_event_id),
            Some("4+5.2_202601281000".to_string())
        );
        assert_eq!(
            dispatcher.sent(),
            vec![Sent::Text(
                1,
                "Power outage for 4, 5.2 starts at 10:00 (in 10 min)".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn run_once__should_remind_upcoming_block_while_another_queue_is_off() {
        // Given
        let clock = TestClock::new(at(28, 10, 15));
        let (engine, repository, dispatcher) = harness(
            vec![region(
                "kyiv",
                &[
                    ("1.1", &[(date(28), grid(&[(20, SlotStatus::Off)]))]),
                    ("1.2", &[(date(28), grid(&[(21, SlotStatus::Off)]))]),
                ],
            )],
            vec![subscriber(1, &["1.1", "1.2"], 30)],
            &clock,
        );

        // When
        let mut sent = 0;
        for minute in [15, 20, 25, 29] {
            clock.set(at(28, 10, minute));
            sent += engine.run_once().await.sent;
        }

        // Then
        assert_eq!(sent, 1);
        assert_eq!(
            repository.get(1).and_then(|s| s.last_reminder_event_id),
            Some("1.2_202601281030".to_string())
        );
        assert_eq!(
            dispatcher.sent(),
            vec![Sent::Text(
                1,
                "Power outage for 1.2 starts at 10:30 (in 15 min)".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn run_once__should_remove_unreachable_subscriber() {
        // Given
        let clock = TestClock::new(at(28, 9, 50));
        let day = grid(&[(20, SlotStatus::Off)]);
        let (engine, repository, dispatcher) = harness(
            vec![region("kyiv", &[("1.1", &[(date(28), day)])])],
            vec![subscriber(1, &["1.1"], 15), subscriber(2, &["1.1"], 15)],
            &clock,
        );
        dispatcher.mark_unreachable(1);

        // When
        let report = engine.run_once().await;

        // Then
        assert_eq!(report.removed, 1);
        assert_eq!(report.sent, 1);
        assert!(repository.get(1).is_none());
        assert!(repository.get(2).is_some());
    }
}
