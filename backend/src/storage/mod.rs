//! # Storage Module
//!
//! Handles all data persistence for the training scheduler.
//!
//! Storage is a single local SQLite database accessed through sqlx from one
//! application process. Repositories own all SQL; the domain layer never
//! sees a row or a query string. Dates and times are persisted as ISO-8601
//! TEXT so that window comparisons work as plain string comparisons.
//!
//! ## Key Responsibilities
//!
//! - **Connection Management**: Pool lifecycle and schema setup
//! - **Data Persistence**: Students, recurrence rules, concrete events
//! - **Invariant Enforcement**: The collision-key UNIQUE constraint on events
//! - **Test Support**: Per-test uniquely named in-memory databases

pub mod connection;
pub mod repositories;

// Re-export the main types that other modules need
pub use connection::DbConnection;
pub use repositories::{EventRepository, RuleRepository, StudentRepository};
