//! Time-bucketed report math.
//!
//! The average-dial-value report slots each dial's per-minute history into
//! fixed intervals, carries the last seen value forward across empty slots,
//! and averages the per-dial series slot by slot. Everything here is pure so
//! the bucketing rules can be tested without a database; the persistence
//! layer only supplies the history points.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::Error;
use crate::domain::Result;

/// Report generated by `DialService::average_dial_value_report`. Each record
/// is the average dial value within one interval of time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialValueReport {
    pub records: Vec<DialValueRecord>,
}

/// Average dial value at a given point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialValueRecord {
    pub timestamp: DateTime<Utc>,
    pub value: i32,
}

/// Returns an error unless `interval` is at least one minute, the
/// resolution of the history series.
pub fn validate_report_interval(interval: Duration) -> Result<()> {
    if interval < Duration::minutes(1) {
        return Err(Error::invalid("Report interval must be at least one minute."));
    }
    Ok(())
}

/// Truncate a timestamp down to a whole minute in UTC. History rows are
/// keyed on this bucket.
pub fn truncate_to_minute(at: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_interval(at, Duration::minutes(1))
}

/// Truncate a timestamp down to a whole multiple of `interval` in UTC.
pub fn truncate_to_interval(at: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.num_seconds().max(1);
    let secs = at.timestamp() - at.timestamp().rem_euclid(step);
    Utc.timestamp_opt(secs, 0).single().unwrap_or(at)
}

/// Number of report slots between two interval-aligned bounds. `end` is
/// exclusive; a non-positive range yields zero slots.
pub fn slot_count(start: DateTime<Utc>, end: DateTime<Utc>, interval: Duration) -> usize {
    let step = interval.num_seconds().max(1);
    let span = (end - start).num_seconds();
    if span <= 0 {
        0
    } else {
        (span / step) as usize
    }
}

/// Build one dial's per-slot series from its history.
///
/// `seed` is the most recent recorded value at or before `start` (if any);
/// `points` are the history rows within `[start, end)` in ascending
/// timestamp order. Each point lands in the slot covering its timestamp and
/// empty slots inherit the previously seen value. Slots before the dial's
/// first recorded value stay `None` so they can be excluded from the
/// average: a dial created mid-report does not drag early slots down with
/// phantom zeros.
pub fn fill_slots(
    seed: Option<i32>,
    points: &[(DateTime<Utc>, i32)],
    start: DateTime<Utc>,
    interval: Duration,
    slots: usize,
) -> Vec<Option<i32>> {
    let mut values = vec![None; slots];
    if slots == 0 {
        return values;
    }

    let step = interval.num_seconds().max(1);
    for (timestamp, value) in points {
        let offset = (*timestamp - start).num_seconds();
        if offset < 0 {
            continue;
        }
        let index = (offset / step) as usize;
        if index < slots {
            values[index] = Some(*value);
        }
    }

    // Carry the last seen value into empty slots, starting from the seed.
    let mut last = seed;
    for slot in values.iter_mut() {
        match slot {
            Some(value) => last = Some(*value),
            None => *slot = last,
        }
    }

    values
}

/// Average the per-dial series slot by slot, dividing by the number of
/// dials contributing to each slot (integer division). Slots with no
/// contributing dial average to 0.
pub fn average_slots(series: &[Vec<Option<i32>>], slots: usize) -> Vec<i32> {
    (0..slots)
        .map(|i| {
            let mut sum: i64 = 0;
            let mut count: i64 = 0;
            for values in series {
                if let Some(value) = values.get(i).copied().flatten() {
                    sum += i64::from(value);
                    count += 1;
                }
            }
            if count == 0 {
                0
            } else {
                (sum / count) as i32
            }
        })
        .collect()
}

/// Assemble the report records from the slot averages.
pub fn build_report(
    start: DateTime<Utc>,
    interval: Duration,
    averages: &[i32],
) -> DialValueReport {
    let records = averages
        .iter()
        .enumerate()
        .map(|(i, value)| DialValueRecord {
            timestamp: start + interval * i as i32,
            value: *value,
        })
        .collect();
    DialValueReport { records }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorCode;
    use rstest::rstest;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 10, hour, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    #[rstest]
    fn interval_below_one_minute_is_invalid() {
        let error = validate_report_interval(Duration::seconds(59)).expect_err("too small");
        assert_eq!(error.code(), ErrorCode::Invalid);
        assert!(validate_report_interval(Duration::minutes(1)).is_ok());
        assert!(validate_report_interval(Duration::hours(1)).is_ok());
    }

    #[rstest]
    fn truncation_drops_sub_interval_precision() {
        let ts = Utc
            .with_ymd_and_hms(2026, 7, 10, 14, 37, 42)
            .single()
            .expect("valid timestamp");
        assert_eq!(truncate_to_minute(ts), at(14, 37));
        assert_eq!(truncate_to_interval(ts, Duration::hours(1)), at(14, 0));
        // Already-aligned timestamps are untouched.
        assert_eq!(truncate_to_interval(at(14, 0), Duration::hours(1)), at(14, 0));
    }

    #[rstest]
    fn slot_count_is_zero_for_empty_or_inverted_ranges() {
        assert_eq!(slot_count(at(5, 0), at(5, 0), Duration::hours(1)), 0);
        assert_eq!(slot_count(at(5, 0), at(4, 0), Duration::hours(1)), 0);
        assert_eq!(slot_count(at(0, 0), at(5, 0), Duration::hours(1)), 5);
    }

    #[rstest]
    fn fill_slots_carries_values_forward() {
        // Dial history: 50 at 01:00, 100 at 04:00; seeded with 0 from
        // before the range. One-hour slots over [00:00, 05:00).
        let points = vec![(at(1, 0), 50), (at(4, 0), 100)];
        let values = fill_slots(Some(0), &points, at(0, 0), Duration::hours(1), 5);
        assert_eq!(
            values,
            vec![Some(0), Some(50), Some(50), Some(50), Some(100)]
        );
    }

    #[rstest]
    fn fill_slots_without_seed_leaves_leading_slots_empty() {
        let points = vec![(at(2, 0), 40)];
        let values = fill_slots(None, &points, at(0, 0), Duration::hours(1), 5);
        assert_eq!(values, vec![None, None, Some(40), Some(40), Some(40)]);
    }

    #[rstest]
    fn fill_slots_keeps_last_write_within_a_slot() {
        // Two writes inside the same slot: the later one wins because the
        // history series itself holds one row per bucket, but even raw
        // points collapse to the last placement.
        let points = vec![(at(1, 10), 30), (at(1, 40), 60)];
        let values = fill_slots(Some(0), &points, at(0, 0), Duration::hours(1), 3);
        assert_eq!(values, vec![Some(0), Some(60), Some(60)]);
    }

    #[rstest]
    fn average_slots_divides_by_contributing_dials_only() {
        // Dial A existed the whole time; dial B only from slot 2 onward.
        let series = vec![
            vec![Some(10), Some(10), Some(30), Some(30)],
            vec![None, None, Some(50), Some(50)],
        ];
        assert_eq!(average_slots(&series, 4), vec![10, 10, 40, 40]);
    }

    #[rstest]
    fn average_slots_floors_the_division() {
        let series = vec![
            vec![Some(0)],
            vec![Some(50)],
            vec![Some(50)],
        ];
        // (0 + 50 + 50) / 3 = 33.33.. floors to 33.
        assert_eq!(average_slots(&series, 1), vec![33]);
    }

    #[rstest]
    fn average_slots_with_no_dials_is_zero() {
        assert_eq!(average_slots(&[], 3), vec![0, 0, 0]);
    }

    #[rstest]
    fn report_scenario_single_dial_hourly() {
        // One dial: average 0 until 01:00, 25 after a member sets 50, and
        // 50 after another change at 04:00. Report over [00:00, 05:00) at
        // one-hour intervals.
        let points = vec![(at(0, 0), 0), (at(1, 0), 25), (at(4, 0), 50)];
        let values = fill_slots(None, &points, at(0, 0), Duration::hours(1), 5);
        let averages = average_slots(&[values], 5);
        let report = build_report(at(0, 0), Duration::hours(1), &averages);

        let expected: Vec<(DateTime<Utc>, i32)> = vec![
            (at(0, 0), 0),
            (at(1, 0), 25),
            (at(2, 0), 25),
            (at(3, 0), 25),
            (at(4, 0), 50),
        ];
        let got: Vec<(DateTime<Utc>, i32)> = report
            .records
            .iter()
            .map(|r| (r.timestamp, r.value))
            .collect();
        assert_eq!(got, expected);
    }
}
