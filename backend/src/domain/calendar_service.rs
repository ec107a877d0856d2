use chrono::NaiveDate;
use log::info;
use std::sync::Arc;

use crate::domain::dates::last_of_month;
use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::reconciliation::reconcile;
use crate::storage::{DbConnection, EventRepository, RuleRepository};
use shared::CalendarEntry;

/// The reconciled read path: loads rules and events for a window and merges
/// them into the visual calendar. Performs no writes.
#[derive(Clone)]
pub struct CalendarService {
    rule_repository: RuleRepository,
    event_repository: EventRepository,
}

impl CalendarService {
    /// Create a new CalendarService
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self {
            rule_repository: RuleRepository::new((*db).clone()),
            event_repository: EventRepository::new((*db).clone()),
        }
    }

    /// Reconciled calendar entries for `[window_start, window_end]`,
    /// optionally restricted to one student
    pub async fn get_calendar(
        &self,
        window_start: NaiveDate,
        window_end: NaiveDate,
        student_id: Option<&str>,
    ) -> SchedulerResult<Vec<CalendarEntry>> {
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
        let events = self
            .event_repository
            .list_events_in_window(student_id, window_start, window_end)
            .await?;

        info!(
            "Reconciling calendar {}..{}: {} rules, {} events",
            window_start,
            window_end,
            rules.len(),
            events.len()
        );

        Ok(reconcile(window_start, window_end, &rules, &events))
    }

    /// Convenience month view: the reconciled calendar for one whole month
    pub async fn get_calendar_month(
        &self,
        month: u32,
        year: i32,
        student_id: Option<&str>,
    ) -> SchedulerResult<Vec<CalendarEntry>> {
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            SchedulerError::validation(format!("Invalid month: {}/{}", month, year))
        })?;

        self.get_calendar(first, last_of_month(first), student_id).await
    }
}
