use thiserror::Error;

/// Error taxonomy surfaced by all domain services.
///
/// `Validation` and `NotFound` pass through to the caller unmodified so the
/// UI can show a precise message; `Storage` wraps whatever the store
/// reported.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("storage operation failed: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SchedulerError {
    pub fn validation(message: impl Into<String>) -> Self {
        SchedulerError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        SchedulerError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
