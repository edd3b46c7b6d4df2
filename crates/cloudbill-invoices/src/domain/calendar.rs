//! Month boundaries and inclusive day counting.
//!
//! All instants are UTC. A "month end" is the last whole second of the month
//! (23:59:59 on its last day), which is the default end of every line item.

use crate::error::{BillingError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

const LAST_SECOND_OF_DAY: i64 = 24 * 60 * 60 - 1;

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Gregorian day count of the given month. Months outside 1..=12 yield 0.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

pub fn end_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(instant.date_naive()) + Duration::seconds(LAST_SECOND_OF_DAY)
}

/// Day 1, 00:00:00 of the month containing `instant`.
pub fn month_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    let date = instant.date_naive();
    start_of_day(date - Duration::days(i64::from(date.day0())))
}

/// Last day, 23:59:59 of the month containing `instant`.
pub fn month_end(instant: DateTime<Utc>) -> DateTime<Utc> {
    let first = month_start(instant);
    let days = days_in_month(first.year(), first.month());
    first + Duration::days(i64::from(days) - 1) + Duration::seconds(LAST_SECOND_OF_DAY)
}

/// Inclusive number of calendar days touched by `[start, end]`.
///
/// A window starting and ending on the same day counts as one day. Fails when
/// `end` precedes `start`.
pub fn full_days(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
    if end < start {
        return Err(BillingError::precondition(format!(
            "cannot count days: end {} precedes start {}",
            end, start
        )));
    }
    Ok((end.date_naive() - start.date_naive()).num_days() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_days_in_month_is_leap_aware() {
        assert_eq!(days_in_month(2017, 1), 31);
        assert_eq!(days_in_month(2017, 2), 28);
        assert_eq!(days_in_month(2016, 2), 29);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(2017, 4), 30);
        assert_eq!(days_in_month(2017, 13), 0);
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(at(2017, 1, 15, 10, 30, 0)), at(2017, 1, 31, 23, 59, 59));
        assert_eq!(month_end(at(2016, 2, 1, 0, 0, 0)), at(2016, 2, 29, 23, 59, 59));
        assert_eq!(month_end(at(2017, 12, 31, 23, 59, 59)), at(2017, 12, 31, 23, 59, 59));
    }

    #[test]
    fn test_month_start_and_end_of_day() {
        assert_eq!(month_start(at(2017, 7, 20, 8, 0, 0)), at(2017, 7, 1, 0, 0, 0));
        assert_eq!(end_of_day(at(2017, 7, 20, 8, 0, 0)), at(2017, 7, 20, 23, 59, 59));
    }

    #[test]
    fn test_full_days_is_inclusive() {
        let start = at(2017, 1, 15, 0, 0, 0);
        assert_eq!(full_days(start, at(2017, 1, 31, 23, 59, 59)).unwrap(), 17);
        assert_eq!(full_days(start, start).unwrap(), 1);
        assert_eq!(full_days(start, at(2017, 1, 15, 22, 0, 0)).unwrap(), 1);
        assert_eq!(full_days(at(2017, 1, 31, 23, 0, 0), at(2017, 2, 1, 1, 0, 0)).unwrap(), 2);
    }

    #[test]
    fn test_full_days_rejects_reversed_window() {
        let result = full_days(at(2017, 1, 15, 0, 0, 0), at(2017, 1, 14, 0, 0, 0));
        assert!(matches!(result, Err(BillingError::Precondition { .. })));
    }
}
