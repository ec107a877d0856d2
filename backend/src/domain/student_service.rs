use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::storage::{DbConnection, StudentRepository};
use shared::{CreateStudentRequest, Student, StudentListResponse, StudentResponse};

const MAX_NAME_LENGTH: usize = 128;

/// Service for managing the students the trainer schedules classes with
#[derive(Clone)]
pub struct StudentService {
    student_repository: StudentRepository,
}

impl StudentService {
    /// Create a new StudentService
    pub fn new(db: Arc<DbConnection>) -> Self {
        let student_repository = StudentRepository::new((*db).clone());
        Self { student_repository }
    }

    /// Create a new student
    pub async fn create_student(
        &self,
        request: CreateStudentRequest,
    ) -> SchedulerResult<StudentResponse> {
        info!("Creating student: name={}", request.name);

        let name = request.name.trim();
        if name.is_empty() {
            return Err(SchedulerError::validation("Student name cannot be empty"));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(SchedulerError::validation(format!(
                "Student name is too long (max {} characters)",
                MAX_NAME_LENGTH
            )));
        }

        let timestamp_rfc3339 = Utc::now().to_rfc3339();
        let student = Student {
            id: Student::generate_id(),
            name: name.to_string(),
            created_at: timestamp_rfc3339.clone(),
            updated_at: timestamp_rfc3339,
        };

        self.student_repository.store_student(&student).await?;

        info!("Created student: {} with ID: {}", student.name, student.id);

        Ok(StudentResponse {
            student,
            success_message: "Student created successfully".to_string(),
        })
    }

    /// Get a student by ID
    pub async fn get_student(&self, student_id: &str) -> SchedulerResult<Option<Student>> {
        let student = self.student_repository.get_student(student_id).await?;

        if student.is_none() {
            warn!("Student not found: {}", student_id);
        }

        Ok(student)
    }

    /// List all students
    pub async fn list_students(&self) -> SchedulerResult<StudentListResponse> {
        let students = self.student_repository.list_students().await?;

        info!("Found {} students", students.len());

        Ok(StudentListResponse { students })
    }

    /// Look up a student or fail with NotFound; used by the other services
    /// before they attach rules or events to an ID
    pub(crate) async fn require_student(&self, student_id: &str) -> SchedulerResult<Student> {
        self.student_repository
            .get_student(student_id)
            .await?
            .ok_or_else(|| SchedulerError::not_found("student", student_id))
    }
}
