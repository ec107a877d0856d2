//! Calendar date arithmetic shared by the read path and the materializer.

use chrono::{Datelike, NaiveDate};

/// Weekday number of a date in the scheme used throughout the app
/// (0 = Sunday, ..., 6 = Saturday)
pub fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// First day of the month containing `date`
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    // with_day(1) cannot fail for a valid date
    date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing `date`
pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = add_months(date.year(), date.month(), 1);
    let next_first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date);
    next_first.pred_opt().unwrap_or(date)
}

/// Shift a (year, month) pair forward by `delta` months
pub fn add_months(year: i32, month: u32, delta: u32) -> (i32, u32) {
    let total = year * 12 + (month as i32 - 1) + delta as i32;
    (total.div_euclid(12), total.rem_euclid(12) as u32 + 1)
}

/// The materialization window for a look-ahead horizon of `months`:
/// from the start of `today`'s month through the last day of the month
/// `months` after it.
pub fn look_ahead_window(today: NaiveDate, months: u32) -> (NaiveDate, NaiveDate) {
    let start = first_of_month(today);
    let (year, month) = add_months(today.year(), today.month(), months);
    let end = match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(first) => last_of_month(first),
        None => last_of_month(today),
    };
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekday_number() {
        assert_eq!(weekday_number(date(2024, 1, 7)), 0); // Sunday
        assert_eq!(weekday_number(date(2024, 1, 1)), 1); // Monday
        assert_eq!(weekday_number(date(2024, 1, 6)), 6); // Saturday
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(first_of_month(date(2024, 2, 15)), date(2024, 2, 1));
        assert_eq!(last_of_month(date(2024, 2, 15)), date(2024, 2, 29)); // leap year
        assert_eq!(last_of_month(date(2025, 2, 1)), date(2025, 2, 28));
        assert_eq!(last_of_month(date(2024, 12, 31)), date(2024, 12, 31));
    }

    #[test]
    fn test_add_months_year_rollover() {
        assert_eq!(add_months(2024, 11, 1), (2024, 12));
        assert_eq!(add_months(2024, 11, 2), (2025, 1));
        assert_eq!(add_months(2024, 1, 24), (2026, 1));
        assert_eq!(add_months(2024, 6, 0), (2024, 6));
    }

    #[test]
    fn test_look_ahead_window() {
        // 2 months ahead from mid-June: June 1 through August 31
        let (start, end) = look_ahead_window(date(2025, 6, 15), 2);
        assert_eq!(start, date(2025, 6, 1));
        assert_eq!(end, date(2025, 8, 31));

        // 0 months: just the current month
        let (start, end) = look_ahead_window(date(2025, 6, 15), 0);
        assert_eq!(start, date(2025, 6, 1));
        assert_eq!(end, date(2025, 6, 30));

        // Crossing a year boundary
        let (start, end) = look_ahead_window(date(2024, 11, 20), 3);
        assert_eq!(start, date(2024, 11, 1));
        assert_eq!(end, date(2025, 2, 28));
    }
}
