use anyhow::Result;
use sqlx::Row;

use crate::storage::connection::DbConnection;
use shared::Student;

/// Repository for student records
#[derive(Clone)]
pub struct StudentRepository {
    db: DbConnection,
}

impl StudentRepository {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Store a new student in the database
    pub async fn store_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&student.id)
        .bind(&student.name)
        .bind(&student.created_at)
        .bind(&student.updated_at)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Get a student by ID
    pub async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, created_at, updated_at
            FROM students
            WHERE id = ?
            "#,
        )
        .bind(student_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(r) => Ok(Some(Student {
                id: r.get("id"),
                name: r.get("name"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            })),
            None => Ok(None),
        }
    }

    /// List all students ordered by name
    pub async fn list_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at, updated_at
            FROM students
            ORDER BY name
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        let students = rows
            .iter()
            .map(|row| Student {
                id: row.get("id"),
                name: row.get("name"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            })
            .collect();

        Ok(students)
    }
}
