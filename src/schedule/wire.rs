//! Decoding of the upstream payloads into domain grids.
//!
//! Primary feed: a JSON envelope whose `body` field holds (as a string) the
//! dataset `{date_today, date_tomorrow, regions: [{cpu, emergency, schedule}]}`
//! where `schedule` is `queue -> iso date -> "HH:MM" -> code`.
//!
//! Secondary feed: a list of day objects
//! `{eventDate: "DD.MM.YYYY", queues: {queue: [{from: "HH:MM", to: "HH:MM"}]}}`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Time};
use tracing::debug;

use crate::ports::FetchError;
use crate::types::schedule::{DayGrid, DaySchedule, RegionEntry, SLOTS_PER_DAY, SlotStatus, slot_index};

const MINUTES_PER_SLOT: u32 = 30;

#[derive(Debug, Deserialize)]
struct Envelope {
    body: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PrimaryBody {
    regions: Vec<RawRegion>,
}

type RawQueueSchedule = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Deserialize)]
struct RawRegion {
    cpu: String,
    #[serde(default)]
    emergency: Option<Value>,
    #[serde(default)]
    schedule: Option<BTreeMap<String, RawQueueSchedule>>,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    #[serde(rename = "eventDate")]
    event_date: Option<String>,
    #[serde(default)]
    queues: BTreeMap<String, Vec<RawInterval>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawInterval {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawQueueCode {
    code: Option<Value>,
}

pub(crate) fn decode_primary(bytes: &[u8]) -> Result<Vec<RegionEntry>, FetchError> {
    let envelope: Envelope = serde_json::from_slice(bytes)
        .map_err(|err| FetchError::Malformed(format!("invalid envelope: {err}")))?;
    let body = match envelope.body {
        Some(Value::String(text)) => serde_json::from_str::<PrimaryBody>(&text),
        Some(value @ Value::Object(_)) => serde_json::from_value::<PrimaryBody>(value),
        Some(_) | None => return Err(FetchError::Malformed("missing body".to_string())),
    }
    .map_err(|err| FetchError::Malformed(format!("invalid body: {err}")))?;

    Ok(body.regions.into_iter().map(decode_region).collect())
}

fn decode_region(raw: RawRegion) -> RegionEntry {
    let emergency = match raw.emergency {
        Some(Value::Bool(flag)) => flag,
        Some(Value::Number(number)) => number.as_i64().is_some_and(|value| value != 0),
        _ => false,
    };
    let mut schedule = BTreeMap::new();
    for (queue_id, days) in raw.schedule.unwrap_or_default() {
        let mut decoded = DaySchedule::new();
        for (date, slots) in days {
            let Some(date) = parse_iso_date(&date) else {
                debug!(region = %raw.cpu, queue = %queue_id, date = %date, "skipping undated grid");
                continue;
            };
            decoded.insert(date, decode_slots(&slots));
        }
        schedule.insert(queue_id, decoded);
    }
    RegionEntry {
        cpu: raw.cpu,
        emergency,
        schedule,
    }
}

fn decode_slots(slots: &BTreeMap<String, Value>) -> DayGrid {
    let mut grid = DayGrid::unknown();
    for (label, code) in slots {
        let Some(minutes) = parse_clock(label) else {
            continue;
        };
        if minutes % MINUTES_PER_SLOT != 0 || minutes >= 24 * 60 {
            continue;
        }
        let code = code.as_i64().unwrap_or(0);
        grid.set(
            slot_index((minutes / 60) as u8, (minutes % 60) as u8),
            SlotStatus::from_code(code),
        );
    }
    grid
}

pub(crate) fn decode_secondary(bytes: &[u8], queue_id: &str) -> Result<DaySchedule, FetchError> {
    let days: Vec<RawDay> = serde_json::from_slice(bytes)
        .map_err(|err| FetchError::Malformed(format!("invalid day list: {err}")))?;
    let mut schedule = DaySchedule::new();
    for day in days {
        let Some(date) = day.event_date.as_deref().and_then(parse_dotted_date) else {
            continue;
        };
        let intervals = day.queues.get(queue_id).map(Vec::as_slice).unwrap_or(&[]);
        schedule.insert(date, intervals_to_grid(intervals));
    }
    Ok(schedule)
}

pub(crate) fn decode_queue_list(bytes: &[u8]) -> Result<Vec<String>, FetchError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|err| FetchError::Malformed(format!("invalid queue list: {err}")))?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    let queues = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawQueueCode>(item).ok())
        .filter_map(|item| match item.code? {
            Value::String(code) => Some(code.trim().to_string()),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        })
        .filter(|code| !code.is_empty())
        .collect();
    Ok(queues)
}

/// Every slot starts "on"; each slot whose start falls within a half-open
/// `[from, to)` interval becomes "off".
pub(crate) fn intervals_to_grid(intervals: &[RawInterval]) -> DayGrid {
    let mut grid = DayGrid::filled(SlotStatus::On);
    for interval in intervals {
        let (Some(from), Some(to)) = (
            interval.from.as_deref().and_then(parse_clock),
            interval.to.as_deref().and_then(parse_clock),
        ) else {
            debug!(?interval, "skipping interval with unreadable bounds");
            continue;
        };
        for index in 0..SLOTS_PER_DAY {
            let start = index as u32 * MINUTES_PER_SLOT;
            if start >= from && start < to {
                grid.set(index, SlotStatus::Off);
            }
        }
    }
    grid
}

const CLOCK: &[BorrowedFormatItem<'_>] = format_description!("[hour]:[minute]");
const ISO_DATE: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");
const DOTTED_DATE: &[BorrowedFormatItem<'_>] = format_description!("[day].[month].[year]");

/// Minutes since midnight for `HH:MM`; `24:00` is accepted as end of day.
fn parse_clock(value: &str) -> Option<u32> {
    let value = value.trim();
    if value == "24:00" {
        return Some(24 * 60);
    }
    let time = Time::parse(value, CLOCK).ok()?;
    Some(u32::from(time.hour()) * 60 + u32::from(time.minute()))
}

pub(crate) fn parse_iso_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), ISO_DATE).ok()
}

fn parse_dotted_date(value: &str) -> Option<Date> {
    Date::parse(value.trim(), DOTTED_DATE).ok()
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use time::Month;

    fn date(day: u8) -> Date {
        Date::from_calendar_date(2026, Month::January, day).expect("valid date")
    }

    fn interval(from: &str, to: &str) -> RawInterval {
        RawInterval {
            from: Some(from.to_string()),
            to: Some(to.to_string()),
        }
    }

    #[test]
    fn decode_primary__should_parse_string_body() {
        // Given
        let body = serde_json::json!({
            "date_today": "2020-01-01",
            "date_tomorrow": "2020-01-02",
            "regions": [{
                "cpu": "kyiv",
                "emergency": true,
                "schedule": {"4.1": {"2026-01-28": {"00:00": 1, "08:00": 2, "08:30": 3, "09:15": 2}}}
            }]
        });
        let envelope = serde_json::json!({ "body": body.to_string() });

        // When
        let regions = decode_primary(envelope.to_string().as_bytes()).expect("decode");

        // Then
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.cpu, "kyiv");
        assert!(region.emergency);
        let grid = region.schedule["4.1"][&date(28)];
        assert_eq!(grid.get(0), SlotStatus::On);
        assert_eq!(grid.get(16), SlotStatus::Off);
        assert_eq!(grid.get(17), SlotStatus::Possible);
        assert_eq!(grid.get(18), SlotStatus::Unknown);
        assert_eq!(grid.get(1), SlotStatus::Unknown);
    }

    #[test]
    fn decode_primary__should_reject_missing_body() {
        // When
        let result = decode_primary(br#"{"status": "ok"}"#);

        // Then
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn decode_primary__should_reject_body_without_regions() {
        // Given
        let envelope = serde_json::json!({ "body": "{\"date_today\": \"2026-01-28\"}" });

        // When
        let result = decode_primary(envelope.to_string().as_bytes());

        // Then
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn decode_primary__should_tolerate_region_without_schedule() {
        // Given
        let envelope = serde_json::json!({
            "body": serde_json::json!({"regions": [{"cpu": "lviv", "emergency": null}]}).to_string()
        });

        // When
        let regions = decode_primary(envelope.to_string().as_bytes()).expect("decode");

        // Then
        assert_eq!(regions[0].cpu, "lviv");
        assert!(!regions[0].emergency);
        assert!(regions[0].schedule.is_empty());
    }

    #[test]
    fn intervals_to_grid__should_mark_half_open_ranges() {
        // When
        let grid = intervals_to_grid(&[interval("06:00", "08:30"), interval("22:00", "24:00")]);

        // Then
        assert_eq!(grid.get(11), SlotStatus::On);
        assert_eq!(grid.get(12), SlotStatus::Off);
        assert_eq!(grid.get(16), SlotStatus::Off);
        assert_eq!(grid.get(17), SlotStatus::On);
        assert_eq!(grid.get(43), SlotStatus::On);
        assert_eq!(grid.get(44), SlotStatus::Off);
        assert_eq!(grid.get(47), SlotStatus::Off);
    }

    #[test]
    fn intervals_to_grid__should_mark_slots_starting_inside_unaligned_range() {
        // When
        let grid = intervals_to_grid(&[interval("06:15", "07:10")]);

        // Then
        assert_eq!(grid.get(12), SlotStatus::On);
        assert_eq!(grid.get(13), SlotStatus::Off);
        assert_eq!(grid.get(14), SlotStatus::Off);
        assert_eq!(grid.get(15), SlotStatus::On);
    }

    #[test]
    fn decode_secondary__should_build_grids_per_day() {
        // Given
        let payload = serde_json::json!([
            {"eventDate": "28.01.2026", "queues": {"4.1": [{"from": "10:00", "to": "11:00"}], "5.1": []}},
            {"eventDate": "29.01.2026", "queues": {"5.1": [{"from": "00:00", "to": "01:00"}]}},
            {"eventDate": "not a date", "queues": {}}
        ]);

        // When
        let schedule = decode_secondary(payload.to_string().as_bytes(), "4.1").expect("decode");

        // Then
        assert_eq!(schedule.len(), 2);
        let today = schedule[&date(28)];
        assert_eq!(today.get(20), SlotStatus::Off);
        assert_eq!(today.get(21), SlotStatus::Off);
        assert_eq!(today.get(22), SlotStatus::On);
        assert_eq!(schedule[&date(29)], DayGrid::filled(SlotStatus::On));
    }

    #[test]
    fn decode_queue_list__should_collect_codes() {
        // Given
        let payload = br#"[{"code": "1.1"}, {"code": 2}, {"name": "x"}, "junk"]"#;

        // When
        let queues = decode_queue_list(payload).expect("decode");

        // Then
        assert_eq!(queues, vec!["1.1".to_string(), "2".to_string()]);
    }

    #[test]
    fn parse_clock__should_reject_out_of_range_values() {
        assert_eq!(parse_clock("24:00"), Some(1440));
        assert_eq!(parse_clock("24:30"), None);
        assert_eq!(parse_clock("10:60"), None);
        assert_eq!(parse_clock("ten"), None);
        assert_eq!(parse_clock(" 07:30 "), Some(450));
    }

    #[test]
    fn parse_dates__should_accept_iso_and_dotted_forms_only() {
        assert_eq!(parse_iso_date("2026-01-28"), Some(date(28)));
        assert_eq!(parse_iso_date("2026-02-30"), None);
        assert_eq!(parse_iso_date("28.01.2026"), None);
        assert_eq!(parse_dotted_date("28.01.2026"), Some(date(28)));
        assert_eq!(parse_dotted_date("2026-01-28"), None);
        assert_eq!(parse_dotted_date("not a date"), None);
    }
}
