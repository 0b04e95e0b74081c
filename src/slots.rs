use crate::types::{AvailabilityWindow, Booking, Slot};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

/// Sorts windows and folds overlapping or touching ones together so that no
/// slot is produced twice. Ranges are offsets from local midnight.
pub fn merge_windows(windows: &[AvailabilityWindow]) -> Vec<(Duration, Duration)> {
    let mut ranges: Vec<(Duration, Duration)> = windows
        .iter()
        .filter(|window| window.active)
        .map(AvailabilityWindow::span)
        .filter(|(start, end)| start < end)
        .collect();
    ranges.sort_unstable();

    let mut merged: Vec<(Duration, Duration)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Cuts `[start, end)` into back-to-back slots of `length`. A remainder
/// shorter than one slot is dropped.
pub fn discretize(start: DateTime<Utc>, end: DateTime<Utc>, length: Duration) -> Vec<Slot> {
    let mut slots = vec![];
    if length <= Duration::zero() {
        return slots;
    }

    let mut cursor = start;
    while cursor + length <= end {
        slots.push(Slot {
            start: cursor,
            end: cursor + length,
        });
        cursor += length;
    }
    slots
}

pub fn local_to_utc(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|datetime| datetime.with_timezone(&Utc))
}

/// Start and end of `date` in the host's offset, as UTC instants.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_to_utc(date, NaiveTime::MIN, offset)?;
    Some((start, start + Duration::days(1)))
}

/// Bookable slots of one day. `windows` must already be restricted to the
/// day's weekday and `bookings` to the host.
pub fn compute_slots(
    date: NaiveDate,
    offset: FixedOffset,
    windows: &[AvailabilityWindow],
    bookings: &[Booking],
    slot_length: Duration,
    now: DateTime<Utc>,
) -> Vec<Slot> {
    let Some(midnight) = local_to_utc(date, NaiveTime::MIN, offset) else {
        return vec![];
    };
    let mut slots: Vec<Slot> = merge_windows(windows)
        .into_iter()
        .flat_map(|(start, end)| discretize(midnight + start, midnight + end, slot_length))
        .filter(|slot| slot.start > now)
        .filter(|slot| {
            !bookings
                .iter()
                .filter(|booking| booking.is_active())
                .any(|booking| booking.overlaps(slot.start, slot.end))
        })
        .collect();

    slots.sort_unstable_by(|a, b| a.start.cmp(&b.start));
    slots
}
