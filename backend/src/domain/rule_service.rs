use chrono::{Local, NaiveDate, NaiveTime, Utc};
use log::{info, warn};
use std::sync::Arc;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::student_service::StudentService;
use crate::storage::{DbConnection, RuleRepository};
use shared::{CreateRuleRequest, RecurrenceRule, RuleListResponse, RuleResponse};

/// Service for managing standing weekly recurrence rules
#[derive(Clone)]
pub struct RuleService {
    rule_repository: RuleRepository,
    student_service: StudentService,
}

impl RuleService {
    /// Create a new RuleService
    pub fn new(db: Arc<DbConnection>) -> Self {
        let rule_repository = RuleRepository::new((*db).clone());
        let student_service = StudentService::new(db);
        Self {
            rule_repository,
            student_service,
        }
    }

    /// Create a new recurrence rule
    pub async fn create_rule(&self, request: CreateRuleRequest) -> SchedulerResult<RuleResponse> {
        info!(
            "Creating rule: student={}, weekday={}, start_time={}",
            request.student_id, request.weekday, request.start_time
        );

        if !RecurrenceRule::is_valid_weekday(request.weekday) {
            return Err(SchedulerError::validation(format!(
                "Invalid weekday: {}. Must be 0-6 (Sunday-Saturday)",
                request.weekday
            )));
        }

        let start_time = parse_start_time(&request.start_time)?;
        let valid_from = parse_date("valid_from", &request.valid_from)?;

        if request.duration_minutes == 0 {
            return Err(SchedulerError::validation(
                "Class duration must be at least one minute",
            ));
        }

        self.student_service.require_student(&request.student_id).await?;

        let timestamp_rfc3339 = Utc::now().to_rfc3339();
        let rule = RecurrenceRule {
            id: RecurrenceRule::generate_id(),
            student_id: request.student_id,
            weekday: request.weekday,
            start_time,
            duration_minutes: request.duration_minutes,
            valid_from,
            valid_until: None,
            created_at: timestamp_rfc3339.clone(),
            updated_at: timestamp_rfc3339,
        };

        self.rule_repository.store_rule(&rule).await?;

        info!(
            "Created rule {} for student {}: {}s at {}",
            rule.id,
            rule.student_id,
            rule.day_name(),
            rule.start_time.format("%H:%M")
        );

        Ok(RuleResponse {
            rule,
            success_message: "Recurrence rule created successfully".to_string(),
        })
    }

    /// Get a rule by ID
    pub async fn get_rule(&self, rule_id: &str) -> SchedulerResult<Option<RecurrenceRule>> {
        Ok(self.rule_repository.get_rule(rule_id).await?)
    }

    /// End a rule as of today: its last valid day becomes yesterday.
    ///
    /// The rule row is kept so historical occurrences stay reconstructible.
    pub async fn end_rule(&self, rule_id: &str) -> SchedulerResult<()> {
        self.end_rule_as_of(rule_id, Local::now().date_naive()).await
    }

    /// End a rule relative to an explicit "today"; the clock stays a caller
    /// concern so the operation is deterministic under test
    pub async fn end_rule_as_of(&self, rule_id: &str, today: NaiveDate) -> SchedulerResult<()> {
        let rule = self
            .rule_repository
            .get_rule(rule_id)
            .await?
            .ok_or_else(|| SchedulerError::not_found("rule", rule_id))?;

        let yesterday = today
            .pred_opt()
            .ok_or_else(|| SchedulerError::validation("Cannot end a rule before the epoch"))?;

        if yesterday < rule.valid_from {
            // Ending a rule on or before its first day leaves an empty
            // validity window; expansion of such a rule yields nothing
            warn!(
                "Ending rule {} before its first occurrence ({} < {})",
                rule_id, yesterday, rule.valid_from
            );
        }

        let updated_at = Utc::now().to_rfc3339();
        self.rule_repository
            .set_valid_until(rule_id, Some(yesterday), &updated_at)
            .await?;

        info!("Ended rule {}: valid_until set to {}", rule_id, yesterday);

        Ok(())
    }

    /// List a student's rules still in effect today
    pub async fn list_active_rules(&self, student_id: &str) -> SchedulerResult<RuleListResponse> {
        self.list_active_rules_as_of(student_id, Local::now().date_naive())
            .await
    }

    /// List a student's rules still in effect on an explicit date
    pub async fn list_active_rules_as_of(
        &self,
        student_id: &str,
        today: NaiveDate,
    ) -> SchedulerResult<RuleListResponse> {
        let rules = self.rule_repository.list_active_rules(student_id, today).await?;

        info!("Found {} active rules for student {}", rules.len(), student_id);

        Ok(RuleListResponse { rules })
    }

    /// List all rules ever created for a student, ended ones included
    pub async fn list_rules(&self, student_id: &str) -> SchedulerResult<RuleListResponse> {
        let rules = self.rule_repository.list_rules_for_student(student_id).await?;
        Ok(RuleListResponse { rules })
    }
}

/// Parse a "HH:MM" 24h time from request input
pub(crate) fn parse_start_time(value: &str) -> SchedulerResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| {
        SchedulerError::validation(format!("Invalid start time: {}. Expected HH:MM", value))
    })
}

/// Parse a "YYYY-MM-DD" calendar date from request input
pub(crate) fn parse_date(field: &str, value: &str) -> SchedulerResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        SchedulerError::validation(format!(
            "Invalid {}: {}. Expected YYYY-MM-DD",
            field, value
        ))
    })
}
