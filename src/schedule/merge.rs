//! Merge-don't-regress folding of fresh schedule data into known data.
//!
//! A slot that was known (non-zero) is never overwritten by "unknown". Two
//! different known values are not reconciled: the incoming value wins.

use std::collections::BTreeMap;

use crate::types::schedule::{DayGrid, DaySchedule, RegionEntry, SLOTS_PER_DAY, SlotStatus};

pub(crate) fn merge_grid(old: &DayGrid, new: &DayGrid) -> DayGrid {
    let mut merged = *new;
    for index in 0..SLOTS_PER_DAY {
        if new.get(index) == SlotStatus::Unknown && old.get(index).is_known() {
            merged.set(index, old.get(index));
        }
    }
    merged
}

/// Folds `incoming` days into `existing`: dates missing on either side are
/// kept, shared dates are merged slot by slot.
pub(crate) fn merge_days(existing: &mut DaySchedule, incoming: DaySchedule) {
    for (date, grid) in incoming {
        match existing.get_mut(&date) {
            Some(old) => *old = merge_grid(old, &grid),
            None => {
                existing.insert(date, grid);
            }
        }
    }
}

/// Fills gaps in a freshly fetched region list from the previous snapshot's
/// regions. Regions, queues and dates unknown to the previous snapshot are
/// taken as-is.
pub(crate) fn merge_regions(old: &[RegionEntry], new: &mut [RegionEntry]) {
    let old_by_cpu: BTreeMap<&str, &RegionEntry> = old
        .iter()
        .map(|region| (region.cpu.as_str(), region))
        .collect();

    for region in new.iter_mut() {
        let Some(previous) = old_by_cpu.get(region.cpu.as_str()) else {
            continue;
        };
        for (queue_id, old_days) in &previous.schedule {
            let mut merged = old_days.clone();
            if let Some(new_days) = region.schedule.remove(queue_id) {
                merge_days(&mut merged, new_days);
            }
            region.schedule.insert(queue_id.clone(), merged);
        }
    }
}

/// Folds secondary-source schedules into a region. Queues the region does not
/// know yet are inserted.
pub(crate) fn fold_secondary(region: &mut RegionEntry, fetched: BTreeMap<String, DaySchedule>) {
    for (queue_id, days) in fetched {
        merge_days(region.schedule.entry(queue_id).or_default(), days);
    }
}
