//! Eager persistence of rule occurrences.
//!
//! The legacy alternative to on-the-fly reconciliation: walk every active
//! rule over a look-ahead window and write the occurrences down as
//! RECURRING_GENERATED events, skipping any slot that already has a row.
//! Repeated runs are safe; the collision-key check makes the whole job
//! idempotent. This is a pre-population job layered on top of the
//! reconciled read path, not a replacement for it.

use chrono::{Local, NaiveDate, Utc};
use log::{debug, info, warn};
use std::sync::Arc;

use crate::domain::dates::{last_of_month, look_ahead_window, weekday_number};
use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::expansion::occurrences;
use crate::storage::{DbConnection, EventRepository, RuleRepository};
use shared::{
    Attendance, CollisionKey, ConcreteEvent, EventKind, MaterializeOutcome, RecurrenceRule,
};

/// Why a candidate occurrence was not inserted
#[derive(Debug)]
pub enum SkipReason {
    /// Some event already occupies the collision key
    AlreadyOccupied,
    /// The expanded date is not on the rule's weekday
    WeekdayMismatch { expected: u8, actual: u8 },
    /// The store rejected the row; the failure is tolerated and the job
    /// moves on to the next candidate
    StoreFailed(String),
}

/// Receives per-occurrence diagnostics from the materializer.
///
/// The job's console output goes through this seam so the algorithm stays
/// unit-testable without capturing logs.
pub trait MaterializeObserver: Send + Sync {
    fn occurrence_inserted(&self, rule_id: &str, key: &CollisionKey) {
        let _ = (rule_id, key);
    }

    fn occurrence_skipped(&self, rule_id: &str, key: &CollisionKey, reason: &SkipReason) {
        let _ = (rule_id, key, reason);
    }
}

/// Default observer: writes the job's diagnostics to the log
pub struct LogObserver;

impl MaterializeObserver for LogObserver {
    fn occurrence_inserted(&self, rule_id: &str, key: &CollisionKey) {
        info!("Materialized occurrence of {} at {}", rule_id, key);
    }

    fn occurrence_skipped(&self, rule_id: &str, key: &CollisionKey, reason: &SkipReason) {
        match reason {
            SkipReason::AlreadyOccupied => {
                debug!("Slot {} already occupied, skipping {}", key, rule_id)
            }
            SkipReason::WeekdayMismatch { expected, actual } => warn!(
                "Expansion of {} produced {} on weekday {} (expected {}), skipping",
                rule_id, key, actual, expected
            ),
            SkipReason::StoreFailed(error) => {
                warn!("Failed to materialize {} at {}: {}", rule_id, key, error)
            }
        }
    }
}

/// Service that eagerly persists rule occurrences as concrete events
#[derive(Clone)]
pub struct MaterializerService {
    rule_repository: RuleRepository,
    event_repository: EventRepository,
}

impl MaterializerService {
    /// Create a new MaterializerService
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self {
            rule_repository: RuleRepository::new((*db).clone()),
            event_repository: EventRepository::new((*db).clone()),
        }
    }

    /// Materialize all rule occurrences in `[window_start, window_end]`,
    /// optionally restricted to one student.
    ///
    /// Each insertion is independent: a failure is reported, counted as
    /// skipped, and never aborts the remaining candidates.
    pub async fn materialize(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
        student_id: Option<&str>,
        observer: &dyn MaterializeObserver,
    ) -> SchedulerResult<MaterializeOutcome> {
        if window_start > window_end {
            return Err(SchedulerError::validation(format!(
                "Invalid window: {} is after {}",
                window_start, window_end
            )));
        }

        let rules = self
            .rule_repository
            .list_rules_in_window(student_id, window_start, window_end)
            .await?;

        info!(
            "Materializing {}..{}: {} rules to expand",
            window_start,
            window_end,
            rules.len()
        );

        let mut outcome = MaterializeOutcome::default();

        for rule in &rules {
            for candidate in occurrences(rule, window_start, window_end) {
                outcome.attempted += 1;

                let key = CollisionKey {
                    student_id: rule.student_id.clone(),
                    date: candidate,
                    start_time: rule.start_time,
                };

                // Defensive invariant check: expansion is already weekday
                // constrained, but a date-arithmetic bug here would write a
                // class on the wrong day
                let actual = weekday_number(candidate);
                if actual != rule.weekday {
                    outcome.skipped += 1;
                    observer.occurrence_skipped(
                        &rule.id,
                        &key,
                        &SkipReason::WeekdayMismatch {
                            expected: rule.weekday,
                            actual,
                        },
                    );
                    continue;
                }

                match self.materialize_one(rule, &key).await {
                    Ok(true) => {
                        outcome.inserted += 1;
                        observer.occurrence_inserted(&rule.id, &key);
                    }
                    Ok(false) => {
                        outcome.skipped += 1;
                        observer.occurrence_skipped(&rule.id, &key, &SkipReason::AlreadyOccupied);
                    }
                    Err(error) => {
                        outcome.skipped += 1;
                        observer.occurrence_skipped(
                            &rule.id,
                            &key,
                            &SkipReason::StoreFailed(error.to_string()),
                        );
                    }
                }
            }
        }

        info!(
            "Materialization done: {} attempted, {} inserted, {} skipped",
            outcome.attempted, outcome.inserted, outcome.skipped
        );

        Ok(outcome)
    }

    /// Materialize from the start of the current month through the end of
    /// the month `months` ahead
    pub async fn materialize_look_ahead(
        &self,
        months: u32,
        student_id: Option<&str>,
        observer: &dyn MaterializeObserver,
    ) -> SchedulerResult<MaterializeOutcome> {
        self.materialize_look_ahead_from(Local::now().date_naive(), months, student_id, observer)
            .await
    }

    /// Look-ahead materialization relative to an explicit "today".
    ///
    /// The window is processed one calendar month at a time so a multi-year
    /// horizon never runs as one unbounded batch.
    pub async fn materialize_look_ahead_from(
        &self,
        today: NaiveDate,
        months: u32,
        student_id: Option<&str>,
        observer: &dyn MaterializeObserver,
    ) -> SchedulerResult<MaterializeOutcome> {
        let (start, end) = look_ahead_window(today, months);

        info!(
            "Look-ahead materialization: {} months ahead, window {}..{}",
            months, start, end
        );

        let mut outcome = MaterializeOutcome::default();
        let mut chunk_start = start;

        while chunk_start <= end {
            let chunk_end = end.min(last_of_month(chunk_start));
            outcome.absorb(
                self.materialize(chunk_start, chunk_end, student_id, observer)
                    .await?,
            );

            chunk_start = match chunk_end.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(outcome)
    }

    /// Insert one occurrence unless its slot is already occupied.
    /// Returns whether a row was written.
    async fn materialize_one(
        &self,
        rule: &RecurrenceRule,
        key: &CollisionKey,
    ) -> anyhow::Result<bool> {
        if self.event_repository.exists_at(key).await? {
            return Ok(false);
        }

        let timestamp_rfc3339 = Utc::now().to_rfc3339();
        let event = ConcreteEvent {
            id: ConcreteEvent::generate_id(),
            student_id: rule.student_id.clone(),
            date: key.date,
            start_time: key.start_time,
            duration_minutes: rule.duration_minutes,
            kind: EventKind::RecurringGenerated,
            attendance: Attendance::Scheduled,
            notes: None,
            source_rule_id: Some(rule.id.clone()),
            created_at: timestamp_rfc3339.clone(),
            updated_at: timestamp_rfc3339,
        };

        self.event_repository.store_event(&event).await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calendar_service::CalendarService;
    use crate::domain::event_service::EventService;
    use crate::domain::rule_service::RuleService;
    use crate::domain::student_service::StudentService;
    use shared::{CreateAdHocEventRequest, CreateRuleRequest, CreateStudentRequest};
    use std::sync::Mutex;

    struct TestContext {
        db: Arc<DbConnection>,
        materializer_service: MaterializerService,
        calendar_service: CalendarService,
        rule_service: RuleService,
        event_service: EventService,
        student_id: String,
    }

    async fn setup_test() -> TestContext {
        let db = Arc::new(DbConnection::init_test().await.expect("Failed to init test DB"));
        let materializer_service = MaterializerService::new(db.clone());
        let calendar_service = CalendarService::new(db.clone());
        let rule_service = RuleService::new(db.clone());
        let event_service = EventService::new(db.clone());
        let student_service = StudentService::new(db.clone());

        let student_id = student_service
            .create_student(CreateStudentRequest {
                name: "Test Student".to_string(),
            })
            .await
            .expect("Failed to create test student")
            .student
            .id;

        TestContext {
            db,
            materializer_service,
            calendar_service,
            rule_service,
            event_service,
            student_id,
        }
    }

    async fn create_monday_rule(ctx: &TestContext) -> String {
        ctx.rule_service
            .create_rule(CreateRuleRequest {
                student_id: ctx.student_id.clone(),
                weekday: 1,
                start_time: "10:00".to_string(),
                duration_minutes: 60,
                valid_from: "2024-01-01".to_string(),
            })
            .await
            .expect("Failed to create rule")
            .rule
            .id
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Observer that records every skip reason it sees
    #[derive(Default)]
    struct RecordingObserver {
        skips: Mutex<Vec<String>>,
    }

    impl MaterializeObserver for RecordingObserver {
        fn occurrence_skipped(&self, _rule_id: &str, _key: &CollisionKey, reason: &SkipReason) {
            self.skips
                .lock()
                .expect("observer lock poisoned")
                .push(format!("{:?}", reason));
        }
    }

    #[tokio::test]
    async fn test_materialize_two_month_window() {
        let ctx = setup_test().await;
        create_monday_rule(&ctx).await;

        // January and February 2024 hold 5 + 4 Mondays
        let outcome = ctx
            .materializer_service
            .materialize(date(2024, 1, 1), date(2024, 2, 29), Some(&ctx.student_id), &LogObserver)
            .await
            .expect("Failed to materialize");

        assert_eq!(outcome.attempted, 9);
        assert_eq!(outcome.inserted, 9);
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let ctx = setup_test().await;
        create_monday_rule(&ctx).await;

        let first = ctx
            .materializer_service
            .materialize(date(2024, 1, 1), date(2024, 2, 29), None, &LogObserver)
            .await
            .expect("Failed to materialize");
        assert_eq!(first.inserted, 9);

        let calendar_after_first = ctx
            .calendar_service
            .get_calendar(date(2024, 1, 1), date(2024, 2, 29), None)
            .await
            .expect("Failed to get calendar");

        let observer = RecordingObserver::default();
        let second = ctx
            .materializer_service
            .materialize(date(2024, 1, 1), date(2024, 2, 29), None, &observer)
            .await
            .expect("Failed to materialize again");

        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 9);
        let skips = observer.skips.lock().expect("observer lock poisoned");
        assert!(skips.iter().all(|s| s.contains("AlreadyOccupied")));

        // The reconciled view is unchanged by the second run
        let calendar_after_second = ctx
            .calendar_service
            .get_calendar(date(2024, 1, 1), date(2024, 2, 29), None)
            .await
            .expect("Failed to get calendar");
        assert_eq!(calendar_after_first, calendar_after_second);
    }

    #[tokio::test]
    async fn test_existing_event_of_any_kind_blocks_insertion() {
        let ctx = setup_test().await;
        create_monday_rule(&ctx).await;

        // Ad-hoc event already sits on the second Monday's slot
        ctx.event_service
            .create_ad_hoc_event(CreateAdHocEventRequest {
                student_id: ctx.student_id.clone(),
                date: "2024-01-08".to_string(),
                start_time: "10:00".to_string(),
                duration_minutes: 60,
                notes: None,
            })
            .await
            .expect("Failed to create ad-hoc event");

        let outcome = ctx
            .materializer_service
            .materialize(date(2024, 1, 1), date(2024, 1, 31), None, &LogObserver)
            .await
            .expect("Failed to materialize");

        assert_eq!(outcome.attempted, 5);
        assert_eq!(outcome.inserted, 4);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_insert_is_counted_and_batch_continues() {
        let ctx = setup_test().await;
        create_monday_rule(&ctx).await;

        // Make the store reject exactly one slot's insert
        sqlx::query(
            r#"
            CREATE TRIGGER reject_third_monday BEFORE INSERT ON events
            WHEN NEW.date = '2024-01-15'
            BEGIN
                SELECT RAISE(ABORT, 'simulated storage failure');
            END
            "#,
        )
        .execute(ctx.db.pool())
        .await
        .expect("Failed to create trigger");

        let observer = RecordingObserver::default();
        let outcome = ctx
            .materializer_service
            .materialize(date(2024, 1, 1), date(2024, 1, 31), None, &observer)
            .await
            .expect("A failed insert must not abort the batch");

        assert_eq!(outcome.attempted, 5);
        assert_eq!(outcome.inserted, 4);
        assert_eq!(outcome.skipped, 1);

        let skips = observer.skips.lock().expect("observer lock poisoned");
        assert_eq!(skips.len(), 1);
        assert!(skips[0].contains("StoreFailed"));

        // The Mondays after the failure were still written; the failed one
        // stays a virtual occurrence
        let entries = ctx
            .calendar_service
            .get_calendar(date(2024, 1, 1), date(2024, 1, 31), None)
            .await
            .expect("Failed to get calendar");
        assert_eq!(entries.len(), 5);
        for entry in &entries {
            if entry.date == date(2024, 1, 15) {
                assert_eq!(entry.origin, shared::EntryOrigin::Virtual);
            } else {
                assert_eq!(entry.origin, shared::EntryOrigin::Concrete);
            }
        }
    }

    #[tokio::test]
    async fn test_materialization_respects_rule_validity() {
        let ctx = setup_test().await;
        let rule_id = create_monday_rule(&ctx).await;

        ctx.rule_service
            .end_rule_as_of(&rule_id, date(2024, 1, 16))
            .await
            .expect("Failed to end rule");

        // valid_until is now 2024-01-15; only the first three Mondays remain
        let outcome = ctx
            .materializer_service
            .materialize(date(2024, 1, 1), date(2024, 1, 31), None, &LogObserver)
            .await
            .expect("Failed to materialize");

        assert_eq!(outcome.inserted, 3);
    }

    #[tokio::test]
    async fn test_look_ahead_runs_month_chunks() {
        let ctx = setup_test().await;
        create_monday_rule(&ctx).await;

        // From mid-January, 1 month ahead: Jan 1 .. Feb 29 (2024 is a leap year)
        let outcome = ctx
            .materializer_service
            .materialize_look_ahead_from(date(2024, 1, 15), 1, Some(&ctx.student_id), &LogObserver)
            .await
            .expect("Failed to materialize look-ahead");

        assert_eq!(outcome.inserted, 9);

        // A second pass over the same horizon inserts nothing
        let second = ctx
            .materializer_service
            .materialize_look_ahead_from(date(2024, 1, 15), 1, Some(&ctx.student_id), &LogObserver)
            .await
            .expect("Failed to materialize look-ahead again");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 9);
    }

    #[tokio::test]
    async fn test_materialized_rows_win_over_virtuals_in_reconciliation() {
        let ctx = setup_test().await;
        create_monday_rule(&ctx).await;

        ctx.materializer_service
            .materialize(date(2024, 1, 1), date(2024, 1, 31), None, &LogObserver)
            .await
            .expect("Failed to materialize");

        let entries = ctx
            .calendar_service
            .get_calendar(date(2024, 1, 1), date(2024, 1, 31), None)
            .await
            .expect("Failed to get calendar");

        // Still exactly one entry per Monday, now all concrete
        assert_eq!(entries.len(), 5);
        assert!(entries
            .iter()
            .all(|e| e.origin == shared::EntryOrigin::Concrete));
    }

    #[tokio::test]
    async fn test_inverted_window_is_rejected() {
        let ctx = setup_test().await;

        let result = ctx
            .materializer_service
            .materialize(date(2024, 2, 1), date(2024, 1, 1), None, &LogObserver)
            .await;
        assert!(matches!(result, Err(SchedulerError::Validation(_))));
    }
}
