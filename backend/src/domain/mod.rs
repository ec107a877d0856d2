//! # Domain Module
//!
//! Contains all business logic for the training scheduler.
//!
//! This module encapsulates the core scheduling rules and services. It
//! operates independently of any specific UI or transport and talks to
//! persistence only through the storage layer.
//!
//! ## Module Organization
//!
//! - **student_service**: Student roster management
//! - **rule_service**: Standing weekly recurrence rules and their lifecycle
//! - **event_service**: Concrete events (ad-hoc classes, exceptions, attendance)
//! - **calendar_service**: The reconciled read path merging rules and events
//! - **materializer_service**: Eager pre-population of rule occurrences
//! - **expansion**: Pure rule-to-occurrence expansion
//! - **reconciliation**: Pure merge of virtual occurrences with concrete events
//! - **dates**: Weekday and month arithmetic helpers
//! - **errors**: The shared error taxonomy
//!
//! ## Core Concepts
//!
//! - **Recurrence Rule**: a standing weekly slot ("Mondays at 10:00")
//! - **Concrete Event**: a persisted class row, ad-hoc or rule-derived
//! - **Collision Key**: (student, date, start time) identifying one slot
//! - **Calendar Entry**: one reconciled row of the visual calendar
//!
//! ## Business Rules
//!
//! - One event per collision key; concrete events always win over
//!   virtual occurrences at the same key
//! - Ending a rule caps its validity window but never touches history
//! - Reconciliation is pure and idempotent; reading never writes

pub mod calendar_service;
pub mod dates;
pub mod errors;
pub mod event_service;
pub mod expansion;
pub mod materializer_service;
pub mod reconciliation;
pub mod rule_service;
pub mod student_service;

pub use calendar_service::*;
pub use errors::*;
pub use event_service::*;
pub use expansion::*;
pub use materializer_service::*;
pub use reconciliation::*;
pub use rule_service::*;
pub use student_service::*;
