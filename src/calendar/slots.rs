//! Free-slot computation from busy periods. Pure, no I/O.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::Deserialize;

/// A bookable interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Slot {
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A half-open `[start, end)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// From the next whole hour after `now`, spanning `days`.
    pub fn upcoming(now: DateTime<Utc>, days: u32) -> Self {
        let start = now
            .duration_trunc(Duration::hours(1))
            .map(|h| if h < now { h + Duration::hours(1) } else { h })
            .unwrap_or(now);
        Self {
            start,
            end: start + Duration::days(i64::from(days)),
        }
    }
}

/// Opening hours (UTC). A slot must start in `[open_hour, close_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open_hour: 9,
            close_hour: 17,
        }
    }
}

impl BusinessHours {
    fn admits(&self, slot: &Slot) -> bool {
        let Some(midnight) = slot.start.date_naive().and_hms_opt(0, 0, 0) else {
            return false;
        };
        let midnight = midnight.and_utc();
        let open = midnight + Duration::hours(i64::from(self.open_hour));
        let close = midnight + Duration::hours(i64::from(self.close_hour));
        slot.start >= open && slot.start < close
    }
}

/// Walk `range` in `length` steps and keep every slot that starts inside business
/// hours and overlaps no busy period.
pub fn free_slots(
    range: TimeRange,
    busy: &[TimeRange],
    length: Duration,
    hours: BusinessHours,
) -> Vec<Slot> {
    if length <= Duration::zero() {
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut cursor = range.start;
    while cursor + length <= range.end {
        let slot = Slot {
            start: cursor,
            end: cursor + length,
        };
        if hours.admits(&slot) && !busy.iter().any(|b| slot.overlaps(b)) {
            slots.push(slot);
        }
        cursor += length;
    }
    slots
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    fn day(d: u32) -> TimeRange {
        TimeRange {
            start: at(d, 0, 0),
            end: at(d + 1, 0, 0),
        }
    }

    #[test]
    fn full_free_day_yields_business_hours() {
        let slots = free_slots(day(2), &[], Duration::hours(1), BusinessHours::default());
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0].start, at(2, 9, 0));
        assert_eq!(slots[7].end, at(2, 17, 0));
    }

    #[test]
    fn busy_period_removes_overlapping_slots() {
        let busy = [TimeRange {
            start: at(2, 10, 30),
            end: at(2, 12, 0),
        }];
        let slots = free_slots(day(2), &busy, Duration::hours(1), BusinessHours::default());
        let starts: Vec<u32> = slots.iter().map(|s| s.start.hour()).collect();
        assert_eq!(starts, vec![9, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn busy_period_enclosing_slot_blocks_it() {
        let busy = [TimeRange {
            start: at(2, 8, 0),
            end: at(2, 18, 0),
        }];
        assert!(free_slots(day(2), &busy, Duration::hours(1), BusinessHours::default()).is_empty());
    }

    #[test]
    fn slot_starting_before_close_is_kept() {
        let slots = free_slots(
            day(2),
            &[],
            Duration::minutes(90),
            BusinessHours::default(),
        );
        // 09:00, 10:30, 12:00, 13:30, 15:00 and 16:30 all start before 17:00.
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[5].start, at(2, 16, 30));
        assert_eq!(slots[5].end, at(2, 18, 0));
    }

    #[test]
    fn slot_starting_at_close_is_dropped() {
        let slots = free_slots(day(2), &[], Duration::hours(1), BusinessHours::default());
        assert!(slots.iter().all(|s| s.start < at(2, 17, 0)));
        assert!(slots.iter().all(|s| s.start >= at(2, 9, 0)));
    }

    #[test]
    fn zero_length_yields_nothing() {
        assert!(free_slots(day(2), &[], Duration::zero(), BusinessHours::default()).is_empty());
    }

    #[test]
    fn upcoming_rounds_up_to_next_hour() {
        let range = TimeRange::upcoming(at(2, 9, 15), 7);
        assert_eq!(range.start, at(2, 10, 0));
        assert_eq!(range.end, at(9, 10, 0));
    }

    #[test]
    fn upcoming_on_the_hour_starts_now() {
        let range = TimeRange::upcoming(at(2, 9, 0), 1);
        assert_eq!(range.start, at(2, 9, 0));
    }
}
