use chrono::{NaiveDate, NaiveTime, Utc};
use log::info;
use std::sync::Arc;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::rule_service::{parse_date, parse_start_time};
use crate::domain::student_service::StudentService;
use crate::storage::{DbConnection, EventRepository};
use shared::{
    Attendance, CalendarEntry, CollisionKey, ConcreteEvent, CreateAdHocEventRequest, EntryOrigin,
    EventKind, EventResponse,
};

const MAX_NOTES_LENGTH: usize = 512;

/// Service for managing concrete events: ad-hoc sessions, attendance
/// marking, and the exception rows that override rule occurrences
#[derive(Clone)]
pub struct EventService {
    event_repository: EventRepository,
    student_service: StudentService,
}

impl EventService {
    /// Create a new EventService
    pub fn new(db: Arc<DbConnection>) -> Self {
        let event_repository = EventRepository::new((*db).clone());
        let student_service = StudentService::new(db);
        Self {
            event_repository,
            student_service,
        }
    }

    /// Schedule a one-off session outside any recurrence rule
    pub async fn create_ad_hoc_event(
        &self,
        request: CreateAdHocEventRequest,
    ) -> SchedulerResult<EventResponse> {
        info!(
            "Creating ad-hoc event: student={}, date={}, start_time={}",
            request.student_id, request.date, request.start_time
        );

        let date = parse_date("date", &request.date)?;
        let start_time = parse_start_time(&request.start_time)?;

        if request.duration_minutes == 0 {
            return Err(SchedulerError::validation(
                "Class duration must be at least one minute",
            ));
        }
        if let Some(notes) = &request.notes {
            if notes.len() > MAX_NOTES_LENGTH {
                return Err(SchedulerError::validation(format!(
                    "Notes are too long (max {} characters)",
                    MAX_NOTES_LENGTH
                )));
            }
        }

        self.student_service.require_student(&request.student_id).await?;

        let key = CollisionKey {
            student_id: request.student_id.clone(),
            date,
            start_time,
        };
        self.require_slot_free(&key).await?;

        let event = self
            .insert_event(
                &request.student_id,
                date,
                start_time,
                request.duration_minutes,
                EventKind::AdHoc,
                Attendance::Scheduled,
                request.notes,
                None,
            )
            .await?;

        Ok(EventResponse {
            event,
            success_message: "Class scheduled successfully".to_string(),
        })
    }

    /// Get an event by ID
    pub async fn get_event(&self, event_id: &str) -> SchedulerResult<Option<ConcreteEvent>> {
        Ok(self.event_repository.get_event(event_id).await?)
    }

    /// Set an event's attendance state.
    ///
    /// Any state can be re-set; marking attendance is undoable.
    pub async fn set_attendance(
        &self,
        event_id: &str,
        attendance: Attendance,
    ) -> SchedulerResult<()> {
        let updated_at = Utc::now().to_rfc3339();
        let updated = self
            .event_repository
            .set_attendance(event_id, attendance, &updated_at)
            .await?;

        if !updated {
            return Err(SchedulerError::not_found("event", event_id));
        }

        info!("Set attendance of event {} to {}", event_id, attendance);
        Ok(())
    }

    /// Replace an event's notes in place
    pub async fn update_notes(
        &self,
        event_id: &str,
        notes: Option<&str>,
    ) -> SchedulerResult<()> {
        if let Some(notes) = notes {
            if notes.len() > MAX_NOTES_LENGTH {
                return Err(SchedulerError::validation(format!(
                    "Notes are too long (max {} characters)",
                    MAX_NOTES_LENGTH
                )));
            }
        }

        let updated_at = Utc::now().to_rfc3339();
        let updated = self
            .event_repository
            .set_notes(event_id, notes, &updated_at)
            .await?;

        if !updated {
            return Err(SchedulerError::not_found("event", event_id));
        }

        Ok(())
    }

    /// Cancel one calendar entry.
    ///
    /// A virtual entry is cancelled by materializing an EXCEPTION_CANCEL
    /// event at its collision key. Nothing is deleted; the row exists to
    /// occupy the slot and carry the Cancelled status. A concrete entry is
    /// cancelled in place by updating its attendance.
    pub async fn cancel_occurrence(&self, entry: &CalendarEntry) -> SchedulerResult<()> {
        match entry.origin {
            EntryOrigin::Virtual => {
                let key = entry.collision_key();
                self.require_slot_free(&key).await?;

                self.insert_event(
                    &entry.student_id,
                    entry.date,
                    entry.start_time,
                    entry.duration_minutes,
                    EventKind::ExceptionCancel,
                    Attendance::Cancelled,
                    None,
                    entry.source_rule_id.clone(),
                )
                .await?;

                info!("Cancelled virtual occurrence at {}", key);
                Ok(())
            }
            EntryOrigin::Concrete => {
                let event_id = entry.event_id().ok_or_else(|| {
                    SchedulerError::validation(format!(
                        "Concrete entry carries no event key: {}",
                        entry.key
                    ))
                })?;
                self.set_attendance(event_id, Attendance::Cancelled).await
            }
        }
    }

    /// Move one calendar entry to a new slot.
    ///
    /// The original slot is killed the same way `cancel_occurrence` does it,
    /// and an EXCEPTION_TIME event occupies the new collision key; the moved
    /// class keeps its rule back-reference and notes. Both writes happen in
    /// one transaction, so a storage failure never leaves the class cancelled
    /// without its replacement.
    pub async fn reschedule_occurrence(
        &self,
        entry: &CalendarEntry,
        new_date: NaiveDate,
        new_start_time: NaiveTime,
    ) -> SchedulerResult<EventResponse> {
        let new_key = CollisionKey {
            student_id: entry.student_id.clone(),
            date: new_date,
            start_time: new_start_time,
        };
        if new_key == entry.collision_key() {
            return Err(SchedulerError::validation(
                "New slot is the same as the current one",
            ));
        }
        self.require_slot_free(&new_key).await?;

        let moved = Self::build_event(
            &entry.student_id,
            new_date,
            new_start_time,
            entry.duration_minutes,
            EventKind::ExceptionTime,
            Attendance::Scheduled,
            entry.notes.clone(),
            entry.source_rule_id.clone(),
        );

        match entry.origin {
            EntryOrigin::Virtual => {
                let original_key = entry.collision_key();
                self.require_slot_free(&original_key).await?;

                let cancel = Self::build_event(
                    &entry.student_id,
                    entry.date,
                    entry.start_time,
                    entry.duration_minutes,
                    EventKind::ExceptionCancel,
                    Attendance::Cancelled,
                    None,
                    entry.source_rule_id.clone(),
                );

                self.event_repository
                    .store_events(&[cancel, moved.clone()])
                    .await?;
            }
            EntryOrigin::Concrete => {
                let event_id = entry.event_id().ok_or_else(|| {
                    SchedulerError::validation(format!(
                        "Concrete entry carries no event key: {}",
                        entry.key
                    ))
                })?;

                let updated_at = Utc::now().to_rfc3339();
                let updated = self
                    .event_repository
                    .set_attendance_and_store(event_id, Attendance::Cancelled, &updated_at, &moved)
                    .await?;

                if !updated {
                    return Err(SchedulerError::not_found("event", event_id));
                }
            }
        }

        info!(
            "Rescheduled {} to {} {}",
            entry.key,
            new_date,
            new_start_time.format("%H:%M")
        );

        Ok(EventResponse {
            event: moved,
            success_message: "Class rescheduled successfully".to_string(),
        })
    }

    /// Bulk cleanup: delete events by ID, returning how many were deleted
    pub async fn delete_events(&self, event_ids: &[String]) -> SchedulerResult<u32> {
        let deleted = self.event_repository.delete_events(event_ids).await?;

        info!("Deleted {} of {} requested events", deleted, event_ids.len());

        Ok(deleted)
    }

    /// Reject the operation if the collision key is already occupied
    async fn require_slot_free(&self, key: &CollisionKey) -> SchedulerResult<()> {
        if self.event_repository.exists_at(key).await? {
            return Err(SchedulerError::validation(format!(
                "Slot already occupied: {}",
                key
            )));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_event(
        &self,
        student_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
        kind: EventKind,
        attendance: Attendance,
        notes: Option<String>,
        source_rule_id: Option<String>,
    ) -> SchedulerResult<ConcreteEvent> {
        let event = Self::build_event(
            student_id,
            date,
            start_time,
            duration_minutes,
            kind,
            attendance,
            notes,
            source_rule_id,
        );

        self.event_repository.store_event(&event).await?;

        Ok(event)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_event(
        student_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: u32,
        kind: EventKind,
        attendance: Attendance,
        notes: Option<String>,
        source_rule_id: Option<String>,
    ) -> ConcreteEvent {
        let timestamp_rfc3339 = Utc::now().to_rfc3339();
        ConcreteEvent {
            id: ConcreteEvent::generate_id(),
            student_id: student_id.to_string(),
            date,
            start_time,
            duration_minutes,
            kind,
            attendance,
            notes,
            source_rule_id,
            created_at: timestamp_rfc3339.clone(),
            updated_at: timestamp_rfc3339,
        }
    }
}
