use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::sync::Arc;

// The database URL for the production database
const DATABASE_URL: &str = "sqlite:scheduler.db";

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        // Connect to the database
        let pool = SqlitePool::connect(url).await?;

        // Setup database schema
        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize the standard database
    pub async fn init() -> Result<Self> {
        Self::new(DATABASE_URL).await
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        // Generate a unique database name for tests
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        // Create students table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Create index for ordering students by name
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_students_name
            ON students(name);
            "#,
        )
        .execute(pool)
        .await?;

        // Create recurrence_rules table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recurrence_rules (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                weekday INTEGER NOT NULL CHECK (weekday >= 0 AND weekday <= 6),
                start_time TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
                valid_from TEXT NOT NULL,
                valid_until TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (student_id) REFERENCES students (id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Create index for student_id filtering
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_recurrence_rules_student_id
            ON recurrence_rules(student_id);
            "#,
        )
        .execute(pool)
        .await?;

        // Create events table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
                kind TEXT NOT NULL,
                attendance TEXT NOT NULL,
                notes TEXT,
                source_rule_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (student_id, date, start_time),
                FOREIGN KEY (student_id) REFERENCES students (id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Create index for window queries ordered by date
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_events_student_date
            ON events(student_id, date);
            "#,
        )
        .execute(pool)
        .await?;

        // Create index for rule back-references (cleanup of generated rows)
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_events_source_rule_id
            ON events(source_rule_id);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}
