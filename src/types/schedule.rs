use std::collections::BTreeMap;

use time::{Date, Duration, OffsetDateTime};

pub const SLOTS_PER_DAY: usize = 48;

/// Status of one 30-minute slot. Wire codes: 0 unknown, 1 on, 2 off, 3 possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SlotStatus {
    #[default]
    Unknown,
    On,
    Off,
    Possible,
}

impl SlotStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::On,
            2 => Self::Off,
            3 => Self::Possible,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::On => 1,
            Self::Off => 2,
            Self::Possible => 3,
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::On => "on",
            Self::Off => "off",
            Self::Possible => "possible",
        }
    }
}

/// Index of the slot covering `hour:minute`.
pub fn slot_index(hour: u8, minute: u8) -> usize {
    usize::from(hour) * 2 + usize::from(minute >= 30)
}

/// One day of slots, always total over all 48 intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayGrid([SlotStatus; SLOTS_PER_DAY]);

impl Default for DayGrid {
    fn default() -> Self {
        Self::unknown()
    }
}

impl DayGrid {
    pub fn unknown() -> Self {
        Self::filled(SlotStatus::Unknown)
    }

    pub fn filled(status: SlotStatus) -> Self {
        Self([status; SLOTS_PER_DAY])
    }

    pub fn from_slots(slots: [SlotStatus; SLOTS_PER_DAY]) -> Self {
        Self(slots)
    }

    pub fn get(&self, index: usize) -> SlotStatus {
        self.0.get(index).copied().unwrap_or_default()
    }

    pub fn set(&mut self, index: usize, status: SlotStatus) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = status;
        }
    }

    pub fn slots(&self) -> &[SlotStatus; SLOTS_PER_DAY] {
        &self.0
    }

    /// True when nothing has been published for the day yet: every slot is
    /// unknown, or every slot is "on" (the placeholder some providers emit).
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|slot| *slot == SlotStatus::Unknown)
            || self.0.iter().all(|slot| *slot == SlotStatus::On)
    }
}

pub type DaySchedule = BTreeMap<Date, DayGrid>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegionEntry {
    pub cpu: String,
    pub emergency: bool,
    pub schedule: BTreeMap<String, DaySchedule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub date_today: Date,
    pub date_tomorrow: Date,
    pub regions: Vec<RegionEntry>,
}

impl ScheduleSnapshot {
    pub fn new(today: Date, regions: Vec<RegionEntry>) -> Self {
        Self {
            date_today: today,
            date_tomorrow: next_day(today),
            regions,
        }
    }

    pub fn region(&self, cpu: &str) -> Option<&RegionEntry> {
        self.regions.iter().find(|region| region.cpu == cpu)
    }

    pub fn region_mut(&mut self, cpu: &str) -> Option<&mut RegionEntry> {
        self.regions.iter_mut().find(|region| region.cpu == cpu)
    }

    /// Pins `date_today`/`date_tomorrow` to the wall-clock date. Returns true
    /// when the stored dates were stale.
    pub fn sync_dates(&mut self, today: Date) -> bool {
        if self.date_today == today {
            return false;
        }
        self.date_today = today;
        self.date_tomorrow = next_day(today);
        true
    }

    /// Drops day grids dated before `cutoff`.
    pub fn prune_before(&mut self, cutoff: Date) {
        for region in &mut self.regions {
            for days in region.schedule.values_mut() {
                days.retain(|date, _| *date >= cutoff);
            }
        }
    }

    pub fn lookup(&self, cpu: &str, queue_id: &str) -> Option<(&RegionEntry, &DaySchedule)> {
        let region = self.region(cpu)?;
        let schedule = region.schedule.get(queue_id)?;
        if schedule.is_empty() {
            return None;
        }
        Some((region, schedule))
    }
}

/// One queue's view of the dataset, as handed to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleResult {
    pub region_id: String,
    pub queue_id: String,
    pub date_today: Date,
    pub date_tomorrow: Date,
    pub schedule: DaySchedule,
    pub emergency: bool,
}

impl ScheduleResult {
    /// Grid for `date`, or 48 unknown slots when the date is not present.
    pub fn grid_for(&self, date: Date) -> DayGrid {
        self.schedule.get(&date).copied().unwrap_or_default()
    }

    pub fn today(&self) -> DayGrid {
        self.grid_for(self.date_today)
    }

    pub fn tomorrow(&self) -> DayGrid {
        self.grid_for(self.date_tomorrow)
    }

    /// Status of the slot covering `at` (its local date and time).
    pub fn status_at(&self, at: OffsetDateTime) -> SlotStatus {
        self.grid_for(at.date())
            .get(slot_index(at.hour(), at.minute()))
    }
}

pub fn next_day(date: Date) -> Date {
    date.saturating_add(Duration::days(1))
}
