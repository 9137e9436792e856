use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use learn_core::model::{CourseId, Cursor, ProgressRecord, TopicKey, TopicProgress};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    bool_from_i64, bool_to_i64, conn, index_from_i64, index_to_i64, ser, u32_from_i64,
};
use crate::repository::{ProgressRepository, StorageError};

fn map_topic_row(row: &sqlx::sqlite::SqliteRow) -> Result<(TopicKey, TopicProgress), StorageError> {
    let chapter = index_from_i64("chapter_index", row.try_get("chapter_index").map_err(ser)?)?;
    let topic = index_from_i64("topic_index", row.try_get("topic_index").map_err(ser)?)?;
    let progress = TopicProgress {
        attempted_count: u32_from_i64(
            "attempted_count",
            row.try_get("attempted_count").map_err(ser)?,
        )?,
        correct_count: u32_from_i64("correct_count", row.try_get("correct_count").map_err(ser)?)?,
        quiz_passed: bool_from_i64(row.try_get("quiz_passed").map_err(ser)?),
    };
    Ok((TopicKey::new(chapter, topic), progress))
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(&self, course_id: &CourseId) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT chapter_index, topic_index, completed
            FROM progress_records
            WHERE course_id = ?1
            ",
        )
        .bind(course_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let cursor = Cursor::new(
            index_from_i64("chapter_index", row.try_get("chapter_index").map_err(ser)?)?,
            index_from_i64("topic_index", row.try_get("topic_index").map_err(ser)?)?,
        );
        let completed = bool_from_i64(row.try_get("completed").map_err(ser)?);

        let rows = sqlx::query(
            r"
            SELECT chapter_index, topic_index, attempted_count, correct_count, quiz_passed
            FROM topic_progress
            WHERE course_id = ?1
            ORDER BY chapter_index ASC, topic_index ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut topics = BTreeMap::new();
        for row in &rows {
            let (key, progress) = map_topic_row(row)?;
            topics.insert(key, progress);
        }

        Ok(Some(ProgressRecord::from_parts(
            course_id.clone(),
            cursor,
            topics,
            completed,
        )))
    }

    async fn save_progress(
        &self,
        record: &ProgressRecord,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let course_id = record.course_id().as_str();
        let cursor = record.cursor();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO progress_records (course_id, chapter_index, topic_index, completed, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(course_id) DO UPDATE SET
                chapter_index = excluded.chapter_index,
                topic_index = excluded.topic_index,
                completed = excluded.completed,
                updated_at = excluded.updated_at
            ",
        )
        .bind(course_id)
        .bind(index_to_i64("chapter_index", cursor.chapter_index)?)
        .bind(index_to_i64("topic_index", cursor.topic_index)?)
        .bind(bool_to_i64(record.is_completed()))
        .bind(updated_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // The record is a full snapshot: entries missing from it are dropped.
        sqlx::query("DELETE FROM topic_progress WHERE course_id = ?1")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (key, progress) in record.topic_progress() {
            sqlx::query(
                r"
                INSERT INTO topic_progress (
                    course_id, chapter_index, topic_index,
                    attempted_count, correct_count, quiz_passed
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(course_id)
            .bind(index_to_i64("chapter_index", key.chapter)?)
            .bind(index_to_i64("topic_index", key.topic)?)
            .bind(i64::from(progress.attempted_count))
            .bind(i64::from(progress.correct_count))
            .bind(bool_to_i64(progress.quiz_passed))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
