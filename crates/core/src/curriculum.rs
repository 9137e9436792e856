//! Read-only accessor over the active course.

use std::sync::Arc;

use crate::model::{Chapter, Course, CourseId, CurriculumError, Cursor, Question, Topic, TopicKey};

/// A question of a chapter quiz, tagged with the topic it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterQuestion {
    pub topic_index: usize,
    pub question: Question,
}

/// Shared, immutable view of a loaded course with bounds-checked lookups.
///
/// An `OutOfRange` error from any accessor means a caller produced a cursor
/// the curriculum does not have.
#[derive(Debug, Clone)]
pub struct CurriculumStore {
    course: Arc<Course>,
}

impl CurriculumStore {
    #[must_use]
    pub fn new(course: Course) -> Self {
        Self {
            course: Arc::new(course),
        }
    }

    #[must_use]
    pub fn course(&self) -> &Course {
        &self.course
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        self.course.id()
    }

    #[must_use]
    pub fn chapter_count(&self) -> usize {
        self.course.chapters().len()
    }

    /// # Errors
    ///
    /// Returns `CurriculumError::OutOfRange` for an unknown chapter.
    pub fn chapter_at(&self, chapter: usize) -> Result<&Chapter, CurriculumError> {
        self.course
            .chapters()
            .get(chapter)
            .ok_or(CurriculumError::OutOfRange {
                chapter,
                topic: None,
            })
    }

    /// # Errors
    ///
    /// Returns `CurriculumError::OutOfRange` for an unknown chapter or topic.
    pub fn topic_at(&self, chapter: usize, topic: usize) -> Result<&Topic, CurriculumError> {
        self.chapter_at(chapter)?
            .topics()
            .get(topic)
            .ok_or(CurriculumError::OutOfRange {
                chapter,
                topic: Some(topic),
            })
    }

    #[must_use]
    pub fn contains(&self, cursor: Cursor) -> bool {
        self.topic_at(cursor.chapter_index, cursor.topic_index).is_ok()
    }

    /// Every question of every topic in the chapter, in topic order.
    ///
    /// Empty when no topic of the chapter carries quiz content.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::OutOfRange` for an unknown chapter.
    pub fn aggregated_quiz_for(&self, chapter: usize) -> Result<Vec<ChapterQuestion>, CurriculumError> {
        let chapter = self.chapter_at(chapter)?;
        Ok(chapter
            .topics()
            .iter()
            .enumerate()
            .flat_map(|(topic_index, topic)| {
                topic.questions().iter().map(move |q| ChapterQuestion {
                    topic_index,
                    question: q.clone(),
                })
            })
            .collect())
    }

    /// Whether the cursor sits on the last topic of its chapter.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::OutOfRange` for a cursor outside the course.
    pub fn is_chapter_end(&self, cursor: Cursor) -> Result<bool, CurriculumError> {
        self.topic_at(cursor.chapter_index, cursor.topic_index)?;
        let chapter = self.chapter_at(cursor.chapter_index)?;
        Ok(cursor.topic_index == chapter.last_topic_index())
    }

    /// Cursor one step forward, or `None` at the last topic of the course.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::OutOfRange` for a cursor outside the course.
    pub fn next_cursor(&self, cursor: Cursor) -> Result<Option<Cursor>, CurriculumError> {
        if !self.is_chapter_end(cursor)? {
            return Ok(Some(Cursor::new(cursor.chapter_index, cursor.topic_index + 1)));
        }
        if cursor.chapter_index + 1 < self.chapter_count() {
            return Ok(Some(Cursor::new(cursor.chapter_index + 1, 0)));
        }
        Ok(None)
    }

    /// Cursor one step back, clamped at the first topic.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::OutOfRange` for a cursor outside the course.
    pub fn prev_cursor(&self, cursor: Cursor) -> Result<Cursor, CurriculumError> {
        self.topic_at(cursor.chapter_index, cursor.topic_index)?;
        if cursor.topic_index > 0 {
            return Ok(Cursor::new(cursor.chapter_index, cursor.topic_index - 1));
        }
        if cursor.chapter_index > 0 {
            let prev = cursor.chapter_index - 1;
            let last = self.chapter_at(prev)?.last_topic_index();
            return Ok(Cursor::new(prev, last));
        }
        Ok(Cursor::start())
    }

    /// Bring an arbitrary (e.g. remotely restored) cursor inside the course.
    #[must_use]
    pub fn clamp(&self, cursor: Cursor) -> Cursor {
        let last_chapter = self.chapter_count().saturating_sub(1);
        let chapter_index = cursor.chapter_index.min(last_chapter);
        let last_topic = self
            .course
            .chapters()
            .get(chapter_index)
            .map_or(0, Chapter::last_topic_index);
        Cursor::new(chapter_index, cursor.topic_index.min(last_topic))
    }

    /// Keys of every topic that carries quiz content, in curriculum order.
    pub fn quiz_topic_keys(&self) -> impl Iterator<Item = TopicKey> + '_ {
        self.course
            .chapters()
            .iter()
            .enumerate()
            .flat_map(|(c, chapter)| {
                chapter
                    .topics()
                    .iter()
                    .enumerate()
                    .filter(|(_, topic)| topic.has_quiz())
                    .map(move |(t, _)| TopicKey::new(c, t))
            })
    }
}
