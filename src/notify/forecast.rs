//! Short textual outlook sent along with schedule charts.

use time::OffsetDateTime;

use crate::types::schedule::{DayGrid, SLOTS_PER_DAY, ScheduleResult, SlotStatus, slot_index};

const MINUTES_PER_SLOT: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextChange {
    /// Slot index across today and tomorrow (48 and up is tomorrow).
    pub slot: usize,
    pub status: SlotStatus,
    pub minutes_left: i64,
    pub length_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forecast {
    Change(NextChange),
    /// Off now and nothing later differs.
    OngoingOutage,
    NoMoreToday,
    NoneToday,
}

/// Next slot whose known status differs from the current one. Unknown slots
/// never count as a change.
pub fn forecast(result: &ScheduleResult, now: OffsetDateTime) -> Forecast {
    let today = result.today();
    let slots: Vec<SlotStatus> = today
        .slots()
        .iter()
        .chain(result.tomorrow().slots().iter())
        .copied()
        .collect();
    let current = slot_index(now.hour(), now.minute());
    let status = slots[current];

    let next = (current + 1..slots.len())
        .find(|&index| slots[index] != status && slots[index].is_known());
    let Some(index) = next else {
        return match status {
            SlotStatus::Off => Forecast::OngoingOutage,
            _ if today
                .slots()
                .iter()
                .any(|slot| matches!(slot, SlotStatus::Off | SlotStatus::Possible)) =>
            {
                Forecast::NoMoreToday
            }
            _ => Forecast::NoneToday,
        };
    };

    let run = slots[index..]
        .iter()
        .take_while(|slot| **slot == slots[index])
        .count() as i64;
    let minutes_now = i64::from(now.hour()) * 60 + i64::from(now.minute());
    Forecast::Change(NextChange {
        slot: index,
        status: slots[index],
        minutes_left: index as i64 * MINUTES_PER_SLOT - minutes_now,
        length_minutes: run * MINUTES_PER_SLOT,
    })
}

/// Minutes of "off" in one day.
pub fn outage_minutes(grid: &DayGrid) -> i64 {
    grid.slots()
        .iter()
        .filter(|slot| **slot == SlotStatus::Off)
        .count() as i64
        * MINUTES_PER_SLOT
}

fn span(minutes: i64) -> String {
    match (minutes / 60, minutes % 60) {
        (hours, 0) => format!("{hours}h"),
        (0, minutes) => format!("{minutes}m"),
        (hours, minutes) => format!("{hours}h {minutes}m"),
    }
}

pub fn caption(alias: &str, result: &ScheduleResult, now: OffsetDateTime) -> String {
    let headline = match forecast(result, now) {
        Forecast::Change(change) => {
            let action = match change.status {
                SlotStatus::Off => "outage",
                SlotStatus::Possible => "possible outage",
                _ => "power back",
            };
            let slot = change.slot % SLOTS_PER_DAY;
            let day = if change.slot >= SLOTS_PER_DAY { " tomorrow" } else { "" };
            format!(
                "{alias}: {action} at {:02}:{:02}{day} (in {}, lasts {})",
                slot / 2,
                (slot % 2) * 30,
                span(change.minutes_left),
                span(change.length_minutes)
            )
        }
        Forecast::OngoingOutage => format!("{alias}: outage ongoing, no change scheduled yet"),
        Forecast::NoMoreToday => format!("{alias}: no more outages today"),
        Forecast::NoneToday => format!("{alias}: no outages today"),
    };

    let mut caption = format!(
        "{headline}\nOutages today: {}",
        span(outage_minutes(&result.today()))
    );
    let tomorrow = result.tomorrow();
    if !tomorrow.is_empty() {
        caption.push_str(&format!(", tomorrow: {}", span(outage_minutes(&tomorrow))));
    }
    if result.emergency {
        caption.push_str("\nEmergency outages in effect");
    }
    caption
}
