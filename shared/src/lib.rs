use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A student the trainer holds classes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Student ID in format: "student::<uuid>"
    pub id: String,
    /// Display name (max 128 characters, trimmed)
    pub name: String,
    /// RFC 3339 timestamp
    pub created_at: String,
    /// RFC 3339 timestamp
    pub updated_at: String,
}

impl Student {
    /// Generate a new student ID
    pub fn generate_id() -> String {
        format!("student::{}", uuid::Uuid::new_v4())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStudentRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResponse {
    pub student: Student,
    pub success_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentListResponse {
    pub students: Vec<Student>,
}

/// A standing weekly class pattern for one student.
///
/// A rule is "ended" by setting `valid_until`; rules are never deleted once
/// occurrences may reference them, so history stays intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    /// Rule ID in format: "rule::<uuid>"
    pub id: String,
    /// ID of the student this rule belongs to
    pub student_id: String,
    /// Day of week the class repeats on (0 = Sunday, ..., 6 = Saturday)
    pub weekday: u8,
    /// Class start time (minute precision, 24h)
    pub start_time: NaiveTime,
    /// Class length in minutes (positive)
    pub duration_minutes: u32,
    /// First calendar date the rule is in effect
    pub valid_from: NaiveDate,
    /// Last calendar date the rule is in effect; `None` means open-ended
    pub valid_until: Option<NaiveDate>,
    /// RFC 3339 timestamp
    pub created_at: String,
    /// RFC 3339 timestamp
    pub updated_at: String,
}

impl RecurrenceRule {
    /// Generate a new rule ID
    pub fn generate_id() -> String {
        format!("rule::{}", uuid::Uuid::new_v4())
    }

    /// Validate a weekday value
    pub fn is_valid_weekday(weekday: u8) -> bool {
        weekday <= 6
    }

    /// Get the day name for the configured weekday
    pub fn day_name(&self) -> &'static str {
        match self.weekday {
            0 => "Sunday",
            1 => "Monday",
            2 => "Tuesday",
            3 => "Wednesday",
            4 => "Thursday",
            5 => "Friday",
            6 => "Saturday",
            _ => "Invalid",
        }
    }

    /// Whether the rule is still in effect on the given date
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        match self.valid_until {
            Some(until) => until >= date,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRuleRequest {
    pub student_id: String,
    /// Day of week (0 = Sunday, ..., 6 = Saturday)
    pub weekday: u8,
    /// Start time as "HH:MM" (24h)
    pub start_time: String,
    pub duration_minutes: u32,
    /// First date the rule applies, as "YYYY-MM-DD"
    pub valid_from: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResponse {
    pub rule: RecurrenceRule,
    pub success_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleListResponse {
    pub rules: Vec<RecurrenceRule>,
}

/// What kind of record a concrete event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// One-off session scheduled outside any rule
    #[serde(rename = "AD_HOC")]
    AdHoc,
    /// Row written by the materializer from a recurrence rule
    #[serde(rename = "RECURRING_GENERATED")]
    RecurringGenerated,
    /// A rule occurrence moved to a different slot
    #[serde(rename = "EXCEPTION_TIME")]
    ExceptionTime,
    /// A rule occurrence cancelled; the row exists only to occupy the slot
    #[serde(rename = "EXCEPTION_CANCEL")]
    ExceptionCancel,
}

impl EventKind {
    /// Stable string form used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AdHoc => "AD_HOC",
            EventKind::RecurringGenerated => "RECURRING_GENERATED",
            EventKind::ExceptionTime => "EXCEPTION_TIME",
            EventKind::ExceptionCancel => "EXCEPTION_CANCEL",
        }
    }

    /// Parse the storage string form
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AD_HOC" => Some(EventKind::AdHoc),
            "RECURRING_GENERATED" => Some(EventKind::RecurringGenerated),
            "EXCEPTION_TIME" => Some(EventKind::ExceptionTime),
            "EXCEPTION_CANCEL" => Some(EventKind::ExceptionCancel),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attendance state of a class.
///
/// `Scheduled` is the initial state; the other three can be set and unset
/// freely by the trainer (marking attendance is undoable), so none of them
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attendance {
    #[serde(rename = "SCHEDULED")]
    Scheduled,
    #[serde(rename = "ATTENDED")]
    Attended,
    #[serde(rename = "MISSED")]
    Missed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl Attendance {
    /// Stable string form used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Attendance::Scheduled => "SCHEDULED",
            Attendance::Attended => "ATTENDED",
            Attendance::Missed => "MISSED",
            Attendance::Cancelled => "CANCELLED",
        }
    }

    /// Parse the storage string form
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SCHEDULED" => Some(Attendance::Scheduled),
            "ATTENDED" => Some(Attendance::Attended),
            "MISSED" => Some(Attendance::Missed),
            "CANCELLED" => Some(Attendance::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for Attendance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slot identity used everywhere override precedence is decided.
///
/// At most one authoritative concrete event may exist per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionKey {
    pub student_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

impl fmt::Display for CollisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.student_id,
            self.date,
            self.start_time.format("%H:%M")
        )
    }
}

/// A point-in-time class record: ad-hoc session, materialized recurring
/// instance, or exception row overriding a rule occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcreteEvent {
    /// Event ID in format: "event::<uuid>"
    pub id: String,
    /// ID of the student this event belongs to
    pub student_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub kind: EventKind,
    pub attendance: Attendance,
    pub notes: Option<String>,
    /// Back-reference to the rule this event overrides or was generated from
    pub source_rule_id: Option<String>,
    /// RFC 3339 timestamp
    pub created_at: String,
    /// RFC 3339 timestamp
    pub updated_at: String,
}

impl ConcreteEvent {
    /// Generate a new event ID
    pub fn generate_id() -> String {
        format!("event::{}", uuid::Uuid::new_v4())
    }

    /// The slot this event occupies
    pub fn collision_key(&self) -> CollisionKey {
        CollisionKey {
            student_id: self.student_id.clone(),
            date: self.date,
            start_time: self.start_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAdHocEventRequest {
    pub student_id: String,
    /// Class date as "YYYY-MM-DD"
    pub date: String,
    /// Start time as "HH:MM" (24h)
    pub start_time: String,
    pub duration_minutes: u32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResponse {
    pub event: ConcreteEvent,
    pub success_message: String,
}

/// Where a calendar entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryOrigin {
    /// Expanded on the fly from a recurrence rule, not persisted
    #[serde(rename = "VIRTUAL")]
    Virtual,
    /// Backed by a persisted concrete event
    #[serde(rename = "CONCRETE")]
    Concrete,
}

/// One row of the reconciled calendar view. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// Stable synthetic identity for UI diffing:
    /// "rule-<ruleId>-<date>" for virtual entries, "event-<eventId>" for
    /// concrete ones
    pub key: String,
    pub student_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub origin: EntryOrigin,
    pub status: Attendance,
    pub notes: Option<String>,
    pub source_rule_id: Option<String>,
}

impl CalendarEntry {
    /// Key for a virtual entry expanded from a rule
    pub fn virtual_key(rule_id: &str, date: NaiveDate) -> String {
        format!("rule-{}-{}", rule_id, date)
    }

    /// Key for an entry backed by a concrete event
    pub fn concrete_key(event_id: &str) -> String {
        format!("event-{}", event_id)
    }

    /// The backing event ID, if this entry is concrete
    pub fn event_id(&self) -> Option<&str> {
        match self.origin {
            EntryOrigin::Concrete => self.key.strip_prefix("event-"),
            EntryOrigin::Virtual => None,
        }
    }

    /// The slot this entry occupies
    pub fn collision_key(&self) -> CollisionKey {
        CollisionKey {
            student_id: self.student_id.clone(),
            date: self.date,
            start_time: self.start_time,
        }
    }
}

/// Tally returned by the materializer.
///
/// `attempted` counts every candidate date considered; each candidate ends
/// up either `inserted` or `skipped` (already present, weekday mismatch, or
/// a tolerated insert failure).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeOutcome {
    pub attempted: u32,
    pub inserted: u32,
    pub skipped: u32,
}

impl MaterializeOutcome {
    /// Fold another chunk's tally into this one
    pub fn absorb(&mut self, other: MaterializeOutcome) {
        self.attempted += other.attempted;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
    }
}
