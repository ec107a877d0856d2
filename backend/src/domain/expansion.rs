//! Occurrence expansion for recurrence rules.
//!
//! Turns a standing weekly rule plus a date window into the calendar dates
//! the rule occupies. The expansion is a lazy, finite iterator recomputed on
//! every call; nothing is cached, so rule edits take effect immediately
//! without any invalidation logic.

use chrono::{Duration, NaiveDate};

use crate::domain::dates::weekday_number;
use shared::RecurrenceRule;

/// Lazy iterator over the dates a rule occupies inside a window.
///
/// Dates are strictly increasing, all on the rule's weekday, and contained
/// in both the rule's validity window and the requested window.
pub struct Occurrences {
    next: Option<NaiveDate>,
    end: NaiveDate,
}

impl Iterator for Occurrences {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next?;
        if current > self.end {
            self.next = None;
            return None;
        }
        self.next = current.checked_add_signed(Duration::days(7));
        Some(current)
    }
}

/// Expand `rule` over the inclusive window `[window_start, window_end]`.
///
/// The recurrence starts at `max(rule.valid_from, window_start)` advanced to
/// the first date on the rule's weekday (the seed date itself is never
/// emitted when it does not qualify) and is bounded by `rule.valid_until`
/// when set. An inverted or empty effective range yields nothing.
pub fn occurrences(
    rule: &RecurrenceRule,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Occurrences {
    let start = rule.valid_from.max(window_start);
    let end = match rule.valid_until {
        Some(until) => window_end.min(until),
        None => window_end,
    };

    Occurrences {
        next: first_on_weekday(start, rule.weekday),
        end,
    }
}

/// Expand `rule` over the window into a collected, sorted list of dates
pub fn expand(
    rule: &RecurrenceRule,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Vec<NaiveDate> {
    occurrences(rule, window_start, window_end).collect()
}

/// First date on or after `from` whose weekday equals `weekday`
fn first_on_weekday(from: NaiveDate, weekday: u8) -> Option<NaiveDate> {
    let days_ahead = (i64::from(weekday) - i64::from(weekday_number(from))).rem_euclid(7);
    from.checked_add_signed(Duration::days(days_ahead))
}
