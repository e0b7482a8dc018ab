//! Content fingerprints (SHA-256, hex) over a canonical byte encoding of
//! schedule data. Maps are walked in key order, so equal content always
//! hashes equally regardless of how it was assembled.

use sha2::{Digest, Sha256};

use crate::types::schedule::{DaySchedule, RegionEntry, ScheduleResult};

/// Fingerprint of everything about a region that subscribers can observe:
/// its per-queue schedules and the emergency flag.
pub fn region_fingerprint(region: &RegionEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update([u8::from(region.emergency)]);
    for (queue_id, days) in &region.schedule {
        hash_queue(&mut hasher, queue_id, days);
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of one queue's schedule, used to key rendered artifacts.
pub fn queue_fingerprint(queue_id: &str, days: &DaySchedule) -> String {
    let mut hasher = Sha256::new();
    hash_queue(&mut hasher, queue_id, days);
    format!("{:x}", hasher.finalize())
}

/// Fingerprint over all of a subscriber's queues and the emergency flag of
/// their region, independent of the order the subscriber listed them in.
pub fn subscriber_fingerprint<'a>(results: impl IntoIterator<Item = &'a ScheduleResult>) -> String {
    let mut results: Vec<&ScheduleResult> = results.into_iter().collect();
    results.sort_by(|left, right| left.queue_id.cmp(&right.queue_id));
    results.dedup_by(|left, right| left.queue_id == right.queue_id);

    let mut hasher = Sha256::new();
    for result in results {
        hasher.update([u8::from(result.emergency)]);
        hash_queue(&mut hasher, &result.queue_id, &result.schedule);
    }
    format!("{:x}", hasher.finalize())
}

fn hash_queue(hasher: &mut Sha256, queue_id: &str, days: &DaySchedule) {
    hasher.update((queue_id.len() as u64).to_le_bytes());
    hasher.update(queue_id.as_bytes());
    hasher.update((days.len() as u64).to_le_bytes());
    for (date, grid) in days {
        hasher.update(date.year().to_le_bytes());
        hasher.update(date.ordinal().to_le_bytes());
        let codes: Vec<u8> = grid.slots().iter().map(|slot| slot.code()).collect();
        hasher.update(&codes);
    }
}
