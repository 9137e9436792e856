use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use learn_core::model::{CourseId, Cursor, QuizSnapshot, ReturnCursor, TopicTally};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{bool_from_i64, bool_to_i64, conn, index_from_i64, index_to_i64, ser};
use crate::repository::{QuizSessionRepository, StorageError, StoredQuiz};

fn map_quiz_row(
    course_id: &CourseId,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<StoredQuiz, StorageError> {
    let cursor = Cursor::new(
        index_from_i64("chapter_index", row.try_get("chapter_index").map_err(ser)?)?,
        index_from_i64("topic_index", row.try_get("topic_index").map_err(ser)?)?,
    );
    let selected = row
        .try_get::<Option<i64>, _>("selected_option")
        .map_err(ser)?
        .map(|v| index_from_i64("selected_option", v))
        .transpose()?;
    let tallies: BTreeMap<usize, TopicTally> =
        serde_json::from_str(&row.try_get::<String, _>("tallies").map_err(ser)?).map_err(ser)?;

    Ok(StoredQuiz {
        snapshot: QuizSnapshot {
            course_id: course_id.clone(),
            return_to: ReturnCursor {
                cursor,
                chapter_title: row.try_get("chapter_title").map_err(ser)?,
            },
            question_index: index_from_i64(
                "question_index",
                row.try_get("question_index").map_err(ser)?,
            )?,
            selected,
            revealed: bool_from_i64(row.try_get("revealed").map_err(ser)?),
            tallies,
        },
        saved_at: row.try_get("saved_at").map_err(ser)?,
    })
}

#[async_trait::async_trait]
impl QuizSessionRepository for SqliteRepository {
    async fn save_quiz(&self, snapshot: &QuizSnapshot, saved_at: DateTime<Utc>) -> Result<(), StorageError> {
        let course_id = snapshot.course_id.as_str();
        let cursor = snapshot.return_to.cursor;
        let chapter_index = index_to_i64("chapter_index", cursor.chapter_index)?;
        let topic_index = index_to_i64("topic_index", cursor.topic_index)?;
        let tallies = serde_json::to_string(&snapshot.tallies).map_err(ser)?;
        let selected = snapshot
            .selected
            .map(|v| index_to_i64("selected_option", v))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            DELETE FROM quiz_sessions
            WHERE course_id = ?1 AND NOT (chapter_index = ?2 AND topic_index = ?3)
            ",
        )
        .bind(course_id)
        .bind(chapter_index)
        .bind(topic_index)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO quiz_sessions (
                course_id, chapter_index, topic_index, chapter_title,
                question_index, selected_option, revealed, tallies, saved_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(course_id, chapter_index, topic_index) DO UPDATE SET
                chapter_title = excluded.chapter_title,
                question_index = excluded.question_index,
                selected_option = excluded.selected_option,
                revealed = excluded.revealed,
                tallies = excluded.tallies,
                saved_at = excluded.saved_at
            ",
        )
        .bind(course_id)
        .bind(chapter_index)
        .bind(topic_index)
        .bind(snapshot.return_to.chapter_title.as_str())
        .bind(index_to_i64("question_index", snapshot.question_index)?)
        .bind(selected)
        .bind(bool_to_i64(snapshot.revealed))
        .bind(tallies)
        .bind(saved_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn load_quiz(&self, course_id: &CourseId) -> Result<Option<StoredQuiz>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT chapter_index, topic_index, chapter_title, question_index,
                   selected_option, revealed, tallies, saved_at
            FROM quiz_sessions
            WHERE course_id = ?1
            ORDER BY saved_at DESC
            LIMIT 1
            ",
        )
        .bind(course_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| map_quiz_row(course_id, &row)).transpose()
    }

    async fn clear_quiz(&self, course_id: &CourseId, return_to: Cursor) -> Result<(), StorageError> {
        sqlx::query(
            r"
            DELETE FROM quiz_sessions
            WHERE course_id = ?1 AND chapter_index = ?2 AND topic_index = ?3
            ",
        )
        .bind(course_id.as_str())
        .bind(index_to_i64("chapter_index", return_to.chapter_index)?)
        .bind(index_to_i64("topic_index", return_to.topic_index)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
