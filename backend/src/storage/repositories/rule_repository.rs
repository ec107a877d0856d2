use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::storage::connection::DbConnection;
use shared::RecurrenceRule;

/// Repository for recurrence rule records.
///
/// Dates and times are stored as ISO-8601 TEXT ("YYYY-MM-DD" / "HH:MM"),
/// which compares correctly as strings in SQL.
#[derive(Clone)]
pub struct RuleRepository {
    db: DbConnection,
}

impl RuleRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Store a new recurrence rule in the database
    pub async fn store_rule(&self, rule: &RecurrenceRule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recurrence_rules
                (id, student_id, weekday, start_time, duration_minutes,
                 valid_from, valid_until, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.student_id)
        .bind(rule.weekday as i64)
        .bind(rule.start_time.format("%H:%M").to_string())
        .bind(rule.duration_minutes as i64)
        .bind(rule.valid_from.to_string())
        .bind(rule.valid_until.map(|d| d.to_string()))
        .bind(&rule.created_at)
        .bind(&rule.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Get a rule by ID
    pub async fn get_rule(&self, rule_id: &str) -> Result<Option<RecurrenceRule>> {
        let row = sqlx::query(
            r#"
            SELECT id, student_id, weekday, start_time, duration_minutes,
                   valid_from, valid_until, created_at, updated_at
            FROM recurrence_rules
            WHERE id = ?
            "#,
        )
        .bind(rule_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_rule(&r)?)),
            None => Ok(None),
        }
    }

    /// Update a rule's validity end date.
    /// Returns true if the rule was found and updated.
    pub async fn set_valid_until(
        &self,
        rule_id: &str,
        valid_until: Option<NaiveDate>,
        updated_at: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE recurrence_rules
            SET valid_until = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(valid_until.map(|d| d.to_string()))
        .bind(updated_at)
        .bind(rule_id)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List all rules for a student
    pub async fn list_rules_for_student(&self, student_id: &str) -> Result<Vec<RecurrenceRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, weekday, start_time, duration_minutes,
                   valid_from, valid_until, created_at, updated_at
            FROM recurrence_rules
            WHERE student_id = ?
            ORDER BY weekday, start_time
            "#,
        )
        .bind(student_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    /// List rules for a student still in effect on the given date
    pub async fn list_active_rules(
        &self,
        student_id: &str,
        on: NaiveDate,
    ) -> Result<Vec<RecurrenceRule>> {
        let rows = sqlx::query(
            r#"
            SELECT id, student_id, weekday, start_time, duration_minutes,
                   valid_from, valid_until, created_at, updated_at
            FROM recurrence_rules
            WHERE student_id = ?
              AND (valid_until IS NULL OR valid_until >= ?)
            ORDER BY weekday, start_time
            "#,
        )
        .bind(student_id)
        .bind(on.to_string())
        .fetch_all(self.db.pool())
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    /// List rules whose validity window intersects [window_start, window_end],
    /// optionally restricted to one student
    pub async fn list_rules_in_window(
        &self,
        student_id: Option<&str>,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<Vec<RecurrenceRule>> {
        let query = if let Some(student_id) = student_id {
            sqlx::query(
                r#"
                SELECT id, student_id, weekday, start_time, duration_minutes,
                       valid_from, valid_until, created_at, updated_at
                FROM recurrence_rules
                WHERE student_id = ?
                  AND valid_from <= ?
                  AND (valid_until IS NULL OR valid_until >= ?)
                ORDER BY weekday, start_time
                "#,
            )
            .bind(student_id)
            .bind(window_end.to_string())
            .bind(window_start.to_string())
        } else {
            sqlx::query(
                r#"
                SELECT id, student_id, weekday, start_time, duration_minutes,
                       valid_from, valid_until, created_at, updated_at
                FROM recurrence_rules
                WHERE valid_from <= ?
                  AND (valid_until IS NULL OR valid_until >= ?)
                ORDER BY weekday, start_time
                "#,
            )
            .bind(window_end.to_string())
            .bind(window_start.to_string())
        };

        let rows = query.fetch_all(self.db.pool()).await?;

        rows.iter().map(row_to_rule).collect()
    }
}

/// Map a database row back to a rule, parsing the stored TEXT dates
fn row_to_rule(row: &SqliteRow) -> Result<RecurrenceRule> {
    let valid_from: String = row.get("valid_from");
    let valid_until: Option<String> = row.get("valid_until");
    let start_time: String = row.get("start_time");

    Ok(RecurrenceRule {
        id: row.get("id"),
        student_id: row.get("student_id"),
        weekday: row.get::<i64, _>("weekday") as u8,
        start_time: NaiveTime::parse_from_str(&start_time, "%H:%M")
            .with_context(|| format!("invalid start_time in rule row: {}", start_time))?,
        duration_minutes: row.get::<i64, _>("duration_minutes") as u32,
        valid_from: NaiveDate::parse_from_str(&valid_from, "%Y-%m-%d")
            .with_context(|| format!("invalid valid_from in rule row: {}", valid_from))?,
        valid_until: valid_until
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .with_context(|| format!("invalid valid_until in rule row: {}", d))
            })
            .transpose()?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
