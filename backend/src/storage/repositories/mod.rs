// Repository modules
pub mod event_repository;
pub mod rule_repository;
pub mod student_repository;

// Re-export repository types
pub use event_repository::EventRepository;
pub use rule_repository::RuleRepository;
pub use student_repository::StudentRepository;
