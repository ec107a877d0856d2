use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};

use crate::storage::connection::DbConnection;
use shared::{Attendance, CollisionKey, ConcreteEvent, EventKind};

/// Repository for concrete event records.
///
/// The `(student_id, date, start_time)` collision key is backed by a UNIQUE
/// constraint, so a racing duplicate insert fails at the store rather than
/// corrupting the calendar.
#[derive(Clone)]
pub struct EventRepository {
    db: DbConnection,
}

impl EventRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Store a new event in the database
    pub async fn store_event(&self, event: &ConcreteEvent) -> Result<()> {
        insert_event_query(event).execute(self.db.pool()).await?;
        Ok(())
    }

    /// Store several events in one transaction: either every row is written
    /// or none is
    pub async fn store_events(&self, events: &[ConcreteEvent]) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        for event in events {
            insert_event_query(event).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Update one event's attendance and store a new event in the same
    /// transaction. Returns false (writing nothing) if the event to update
    /// does not exist.
    pub async fn set_attendance_and_store(
        &self,
        event_id: &str,
        attendance: Attendance,
        updated_at: &str,
        event: &ConcreteEvent,
    ) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE events
            SET attendance = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(attendance.as_str())
        .bind(updated_at)
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        // Dropping the uncommitted transaction rolls it back
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        insert_event_query(event).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Get an event by ID
    pub async fn get_event(&self, event_id: &str) -> Result<Option<ConcreteEvent>> {
        let row = sqlx::query(
            r#"
            SELECT id, student_id, date, start_time, duration_minutes,
                   kind, attendance, notes, source_rule_id, created_at, updated_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(event_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_event(&r)?)),
            None => Ok(None),
        }
    }

    /// Check whether any event occupies the given collision key
    pub async fn exists_at(&self, key: &CollisionKey) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS present
            FROM events
            WHERE student_id = ? AND date = ? AND start_time = ?
            LIMIT 1
            "#,
        )
        .bind(&key.student_id)
        .bind(key.date.to_string())
        .bind(key.start_time.format("%H:%M").to_string())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.is_some())
    }

    /// List events with dates in [window_start, window_end], optionally
    /// restricted to one student, ordered by date and start time
    pub async fn list_events_in_window(
        &self,
        student_id: Option<&str>,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<Vec<ConcreteEvent>> {
        let query = if let Some(student_id) = student_id {
            sqlx::query(
                r#"
                SELECT id, student_id, date, start_time, duration_minutes,
                       kind, attendance, notes, source_rule_id, created_at, updated_at
                FROM events
                WHERE student_id = ? AND date >= ? AND date <= ?
                ORDER BY date, start_time
                "#,
            )
            .bind(student_id)
            .bind(window_start.to_string())
            .bind(window_end.to_string())
        } else {
            sqlx::query(
                r#"
                SELECT id, student_id, date, start_time, duration_minutes,
                       kind, attendance, notes, source_rule_id, created_at, updated_at
                FROM events
                WHERE date >= ? AND date <= ?
                ORDER BY date, start_time
                "#,
            )
            .bind(window_start.to_string())
            .bind(window_end.to_string())
        };

        let rows = query.fetch_all(self.db.pool()).await?;

        rows.iter().map(row_to_event).collect()
    }

    /// Update an event's attendance state in place.
    /// Returns true if the event was found and updated.
    pub async fn set_attendance(
        &self,
        event_id: &str,
        attendance: Attendance,
        updated_at: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET attendance = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(attendance.as_str())
        .bind(updated_at)
        .bind(event_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Update an event's notes in place.
    /// Returns true if the event was found and updated.
    pub async fn set_notes(
        &self,
        event_id: &str,
        notes: Option<&str>,
        updated_at: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(notes)
        .bind(updated_at)
        .bind(event_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete multiple events by ID.
    /// Returns the number of events actually deleted.
    pub async fn delete_events(&self, event_ids: &[String]) -> Result<u32> {
        let mut deleted = 0u32;

        for event_id in event_ids {
            let result = sqlx::query("DELETE FROM events WHERE id = ?")
                .bind(event_id)
                .execute(self.db.pool())
                .await?;
            deleted += result.rows_affected() as u32;
        }

        Ok(deleted)
    }
}

/// The INSERT statement for one event, shared by the plain and the
/// transactional store paths
fn insert_event_query(event: &ConcreteEvent) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO events
            (id, student_id, date, start_time, duration_minutes,
             kind, attendance, notes, source_rule_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.id)
    .bind(&event.student_id)
    .bind(event.date.to_string())
    .bind(event.start_time.format("%H:%M").to_string())
    .bind(event.duration_minutes as i64)
    .bind(event.kind.as_str())
    .bind(event.attendance.as_str())
    .bind(&event.notes)
    .bind(&event.source_rule_id)
    .bind(&event.created_at)
    .bind(&event.updated_at)
}

/// Map a database row back to an event, parsing the stored TEXT fields
fn row_to_event(row: &SqliteRow) -> Result<ConcreteEvent> {
    let date: String = row.get("date");
    let start_time: String = row.get("start_time");
    let kind: String = row.get("kind");
    let attendance: String = row.get("attendance");

    Ok(ConcreteEvent {
        id: row.get("id"),
        student_id: row.get("student_id"),
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("invalid date in event row: {}", date))?,
        start_time: NaiveTime::parse_from_str(&start_time, "%H:%M")
            .with_context(|| format!("invalid start_time in event row: {}", start_time))?,
        duration_minutes: row.get::<i64, _>("duration_minutes") as u32,
        kind: EventKind::parse(&kind).ok_or_else(|| anyhow!("unknown event kind: {}", kind))?,
        attendance: Attendance::parse(&attendance)
            .ok_or_else(|| anyhow!("unknown attendance value: {}", attendance))?,
        notes: row.get("notes"),
        source_rule_id: row.get("source_rule_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
