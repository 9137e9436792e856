use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Creates the local progress cache schema.
///
/// Version 1: cached progress records, their topic entries, and the
/// in-flight quiz snapshot table.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS progress_records (
                    course_id TEXT PRIMARY KEY,
                    chapter_index INTEGER NOT NULL CHECK (chapter_index >= 0),
                    topic_index INTEGER NOT NULL CHECK (topic_index >= 0),
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS topic_progress (
                    course_id TEXT NOT NULL,
                    chapter_index INTEGER NOT NULL CHECK (chapter_index >= 0),
                    topic_index INTEGER NOT NULL CHECK (topic_index >= 0),
                    attempted_count INTEGER NOT NULL CHECK (attempted_count >= 0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    quiz_passed INTEGER NOT NULL CHECK (quiz_passed IN (0, 1)),
                    PRIMARY KEY (course_id, chapter_index, topic_index),
                    FOREIGN KEY (course_id) REFERENCES progress_records(course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_sessions (
                    course_id TEXT NOT NULL,
                    chapter_index INTEGER NOT NULL CHECK (chapter_index >= 0),
                    topic_index INTEGER NOT NULL CHECK (topic_index >= 0),
                    chapter_title TEXT NOT NULL,
                    question_index INTEGER NOT NULL CHECK (question_index >= 0),
                    selected_option INTEGER CHECK (selected_option >= 0),
                    revealed INTEGER NOT NULL CHECK (revealed IN (0, 1)),
                    tallies TEXT NOT NULL,
                    saved_at TEXT NOT NULL,
                    PRIMARY KEY (course_id, chapter_index, topic_index)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
