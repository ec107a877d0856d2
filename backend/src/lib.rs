//! # Training Scheduler Backend
//!
//! Non-UI logic for the recurring class scheduler: a trainer's weekly
//! recurrence rules, the concrete events that override them, and the
//! reconciled calendar built from both.
//!
//! ## Architecture
//!
//! The backend follows a layered architecture:
//! ```text
//! Scheduler facade (this crate root)
//!     |
//! Domain layer (services, pure expansion and reconciliation)
//!     |
//! Storage layer (SQLite repositories)
//! ```
//!
//! Callers construct a [`Scheduler`] via [`initialize_backend`] and reach
//! every operation through its services.

pub mod domain;
pub mod storage;

use anyhow::Result;
use log::info;
use std::sync::Arc;

use crate::domain::{
    CalendarService, EventService, MaterializerService, RuleService, StudentService,
};
use crate::storage::DbConnection;

/// Main application state that holds all services
#[derive(Clone)]
pub struct Scheduler {
    pub student_service: StudentService,
    pub rule_service: RuleService,
    pub event_service: EventService,
    pub calendar_service: CalendarService,
    pub materializer_service: MaterializerService,
}

impl Scheduler {
    /// Wire all services onto one shared database connection
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self {
            student_service: StudentService::new(db.clone()),
            rule_service: RuleService::new(db.clone()),
            event_service: EventService::new(db.clone()),
            calendar_service: CalendarService::new(db.clone()),
            materializer_service: MaterializerService::new(db),
        }
    }
}

/// Initialize the backend with all required services
pub async fn initialize_backend() -> Result<Scheduler> {
    info!("Setting up database");
    let db = Arc::new(DbConnection::init().await?);

    info!("Setting up domain model");
    let scheduler = Scheduler::new(db);

    Ok(scheduler)
}
