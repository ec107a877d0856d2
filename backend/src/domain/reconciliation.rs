//! Reconciliation of recurrence rules with concrete events.
//!
//! This is the primary read path: a pure function that merges rule-expanded
//! virtual occurrences with persisted events for a window into one ordered
//! list of calendar entries. Concrete events always win over virtual
//! occurrences at the same collision key.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::domain::expansion::occurrences;
use shared::{
    Attendance, CalendarEntry, CollisionKey, ConcreteEvent, EntryOrigin, EventKind, RecurrenceRule,
};

/// Display status of a concrete event, first match wins:
/// a cancellation (by kind or attendance) shows Cancelled, a missed class
/// shows Missed, a materialized row or attended class shows Attended,
/// anything else is still Scheduled.
pub fn derive_status(kind: EventKind, attendance: Attendance) -> Attendance {
    if kind == EventKind::ExceptionCancel || attendance == Attendance::Cancelled {
        Attendance::Cancelled
    } else if attendance == Attendance::Missed {
        Attendance::Missed
    } else if kind == EventKind::RecurringGenerated || attendance == Attendance::Attended {
        Attendance::Attended
    } else {
        Attendance::Scheduled
    }
}

/// Merge rules and events for `[window_start, window_end]` into the visual
/// calendar.
///
/// Pure and idempotent: no I/O, identical inputs give identical output, and
/// no two entries share a collision key. `events` must already be filtered
/// to the window.
pub fn reconcile(
    window_start: NaiveDate,
    window_end: NaiveDate,
    rules: &[RecurrenceRule],
    events: &[ConcreteEvent],
) -> Vec<CalendarEntry> {
    let mut entries = Vec::with_capacity(events.len());
    let mut occupied: HashSet<CollisionKey> = HashSet::with_capacity(events.len());

    // Concrete events first; each one claims its slot
    for event in events {
        occupied.insert(event.collision_key());
        entries.push(CalendarEntry {
            key: CalendarEntry::concrete_key(&event.id),
            student_id: event.student_id.clone(),
            date: event.date,
            start_time: event.start_time,
            duration_minutes: event.duration_minutes,
            origin: EntryOrigin::Concrete,
            status: derive_status(event.kind, event.attendance),
            notes: event.notes.clone(),
            source_rule_id: event.source_rule_id.clone(),
        });
    }

    // Virtual occurrences fill the remaining slots
    for rule in rules {
        for date in occurrences(rule, window_start, window_end) {
            let key = CollisionKey {
                student_id: rule.student_id.clone(),
                date,
                start_time: rule.start_time,
            };
            if occupied.contains(&key) {
                continue;
            }
            // Claiming the slot also de-duplicates rules that share one
            occupied.insert(key);

            entries.push(CalendarEntry {
                key: CalendarEntry::virtual_key(&rule.id, date),
                student_id: rule.student_id.clone(),
                date,
                start_time: rule.start_time,
                duration_minutes: rule.duration_minutes,
                origin: EntryOrigin::Virtual,
                status: Attendance::Scheduled,
                notes: None,
                source_rule_id: Some(rule.id.clone()),
            });
        }
    }

    // Deterministic UI ordering: date, then time, concrete before virtual
    entries.sort_by(|a, b| {
        (a.date, a.start_time, origin_rank(a.origin)).cmp(&(
            b.date,
            b.start_time,
            origin_rank(b.origin),
        ))
    });

    entries
}

fn origin_rank(origin: EntryOrigin) -> u8 {
    match origin {
        EntryOrigin::Concrete => 0,
        EntryOrigin::Virtual => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday_rule() -> RecurrenceRule {
        RecurrenceRule {
            id: "rule::monday".to_string(),
            student_id: "student::alice".to_string(),
            weekday: 1,
            start_time: time(10, 0),
            duration_minutes: 60,
            valid_from: date(2024, 1, 1),
            valid_until: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn event_at(
        id: &str,
        d: NaiveDate,
        t: NaiveTime,
        kind: EventKind,
        attendance: Attendance,
    ) -> ConcreteEvent {
        ConcreteEvent {
            id: id.to_string(),
            student_id: "student::alice".to_string(),
            date: d,
            start_time: t,
            duration_minutes: 60,
            kind,
            attendance,
            notes: None,
            source_rule_id: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_rule_only_window_is_all_virtual_scheduled() {
        // Monday 10:00 rule over January 2024 with no events
        let rules = vec![monday_rule()];
        let entries = reconcile(date(2024, 1, 1), date(2024, 1, 31), &rules, &[]);

        assert_eq!(entries.len(), 5);
        for entry in &entries {
            assert_eq!(entry.origin, EntryOrigin::Virtual);
            assert_eq!(entry.status, Attendance::Scheduled);
            assert_eq!(entry.start_time, time(10, 0));
            assert_eq!(entry.source_rule_id.as_deref(), Some("rule::monday"));
        }
        assert_eq!(entries[0].key, "rule-rule::monday-2024-01-01");
    }

    #[test]
    fn test_cancellation_exception_overrides_one_occurrence() {
        // One Monday cancelled; total entry count is unchanged
        let rules = vec![monday_rule()];
        let events = vec![event_at(
            "event::cancel",
            date(2024, 1, 8),
            time(10, 0),
            EventKind::ExceptionCancel,
            Attendance::Cancelled,
        )];

        let entries = reconcile(date(2024, 1, 1), date(2024, 1, 31), &rules, &events);

        assert_eq!(entries.len(), 5);

        let jan_8: Vec<_> = entries.iter().filter(|e| e.date == date(2024, 1, 8)).collect();
        assert_eq!(jan_8.len(), 1);
        assert_eq!(jan_8[0].origin, EntryOrigin::Concrete);
        assert_eq!(jan_8[0].status, Attendance::Cancelled);
        assert_eq!(jan_8[0].key, "event-event::cancel");

        let virtuals = entries
            .iter()
            .filter(|e| e.origin == EntryOrigin::Virtual)
            .count();
        assert_eq!(virtuals, 4);
    }

    #[test]
    fn test_concrete_always_wins_regardless_of_kind() {
        let rules = vec![monday_rule()];
        for kind in [
            EventKind::AdHoc,
            EventKind::RecurringGenerated,
            EventKind::ExceptionTime,
            EventKind::ExceptionCancel,
        ] {
            let events = vec![event_at(
                "event::x",
                date(2024, 1, 15),
                time(10, 0),
                kind,
                Attendance::Scheduled,
            )];
            let entries = reconcile(date(2024, 1, 1), date(2024, 1, 31), &rules, &events);

            let jan_15: Vec<_> =
                entries.iter().filter(|e| e.date == date(2024, 1, 15)).collect();
            assert_eq!(jan_15.len(), 1, "kind {:?} should suppress the virtual", kind);
            assert_eq!(jan_15[0].origin, EntryOrigin::Concrete);
        }
    }

    #[test]
    fn test_ad_hoc_at_other_slot_appears_alongside_virtuals() {
        let rules = vec![monday_rule()];
        let events = vec![event_at(
            "event::extra",
            date(2024, 1, 10), // a Wednesday
            time(14, 0),
            EventKind::AdHoc,
            Attendance::Scheduled,
        )];

        let entries = reconcile(date(2024, 1, 1), date(2024, 1, 31), &rules, &events);
        assert_eq!(entries.len(), 6);
    }

    #[test]
    fn test_status_derivation_table() {
        use Attendance::*;
        use EventKind::*;

        assert_eq!(derive_status(ExceptionCancel, Scheduled), Cancelled);
        assert_eq!(derive_status(ExceptionCancel, Attended), Cancelled);
        assert_eq!(derive_status(AdHoc, Cancelled), Cancelled);
        assert_eq!(derive_status(AdHoc, Missed), Missed);
        assert_eq!(derive_status(RecurringGenerated, Missed), Missed);
        assert_eq!(derive_status(RecurringGenerated, Scheduled), Attended);
        assert_eq!(derive_status(AdHoc, Attended), Attended);
        assert_eq!(derive_status(ExceptionTime, Attended), Attended);
        assert_eq!(derive_status(AdHoc, Scheduled), Scheduled);
        assert_eq!(derive_status(ExceptionTime, Scheduled), Scheduled);
    }

    #[test]
    fn test_no_duplicate_collision_keys() {
        // Two identical rules plus a concrete event on one slot
        let mut duplicate = monday_rule();
        duplicate.id = "rule::monday-copy".to_string();
        let rules = vec![monday_rule(), duplicate];
        let events = vec![event_at(
            "event::one",
            date(2024, 1, 1),
            time(10, 0),
            EventKind::RecurringGenerated,
            Attendance::Scheduled,
        )];

        let entries = reconcile(date(2024, 1, 1), date(2024, 1, 31), &rules, &events);

        let mut seen = HashSet::new();
        for entry in &entries {
            assert!(
                seen.insert((entry.student_id.clone(), entry.date, entry.start_time)),
                "duplicate collision key at {} {}",
                entry.date,
                entry.start_time
            );
        }
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn test_ordering_is_by_date_time_with_concrete_first() {
        let rules = vec![monday_rule()];
        let mut other_student = event_at(
            "event::bob",
            date(2024, 1, 1),
            time(10, 0),
            EventKind::AdHoc,
            Attendance::Scheduled,
        );
        other_student.student_id = "student::bob".to_string();
        let events = vec![
            event_at(
                "event::early",
                date(2024, 1, 1),
                time(8, 0),
                EventKind::AdHoc,
                Attendance::Scheduled,
            ),
            other_student,
        ];

        let entries = reconcile(date(2024, 1, 1), date(2024, 1, 7), &rules, &events);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, "event-event::early");
        // Tie at 10:00 on 01-01: concrete entry sorts before the virtual one
        assert_eq!(entries[1].origin, EntryOrigin::Concrete);
        assert_eq!(entries[1].key, "event-event::bob");
        assert_eq!(entries[2].origin, EntryOrigin::Virtual);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let rules = vec![monday_rule()];
        let events = vec![event_at(
            "event::cancel",
            date(2024, 1, 8),
            time(10, 0),
            EventKind::ExceptionCancel,
            Attendance::Cancelled,
        )];

        let first = reconcile(date(2024, 1, 1), date(2024, 1, 31), &rules, &events);
        let second = reconcile(date(2024, 1, 1), date(2024, 1, 31), &rules, &events);
        assert_eq!(first, second);
    }
}
