//! Decides whether a schedule revision touches what a subscriber can see.

use time::{Date, OffsetDateTime};

use crate::types::schedule::{DayGrid, SLOTS_PER_DAY, ScheduleResult, SlotStatus, slot_index};
use crate::types::subscriber::DisplayMode;

/// True when the revision from `old` to `new` is visible in `mode` at `now`.
///
/// A first observation (`old` absent) and an emergency flip are always
/// relevant. Otherwise the slots the mode renders are compared: the rest of
/// today, followed by either the first part of tomorrow up to the current
/// slot (`dynamic`, a rolling 24 h view) or all of tomorrow (`classic` and
/// `list`, where the subscriber can switch to the tomorrow view).
pub fn is_relevant(
    old: Option<&ScheduleResult>,
    new: &ScheduleResult,
    mode: DisplayMode,
    now: OffsetDateTime,
) -> bool {
    let Some(old) = old else {
        return true;
    };
    if old.emergency != new.emergency {
        return true;
    }

    let current = slot_index(now.hour(), now.minute());
    visible_window(old, new.date_today, new.date_tomorrow, mode, current)
        != visible_window(new, new.date_today, new.date_tomorrow, mode, current)
}

fn visible_window(
    result: &ScheduleResult,
    today: Date,
    tomorrow: Date,
    mode: DisplayMode,
    current: usize,
) -> Vec<SlotStatus> {
    let today: DayGrid = result.grid_for(today);
    let tomorrow: DayGrid = result.grid_for(tomorrow);
    let tomorrow_end = match mode {
        DisplayMode::Dynamic => current,
        DisplayMode::Classic | DisplayMode::List => SLOTS_PER_DAY,
    };

    let mut window = Vec::with_capacity(SLOTS_PER_DAY * 2);
    window.extend_from_slice(&today.slots()[current.min(SLOTS_PER_DAY)..]);
    window.extend_from_slice(&tomorrow.slots()[..tomorrow_end.min(SLOTS_PER_DAY)]);
    window
}
