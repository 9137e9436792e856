use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::CourseId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("progress record belongs to course {found}, expected {expected}")]
    CourseMismatch { expected: CourseId, found: CourseId },

    #[error("invalid topic key `{0}` (expected `chapter:topic`)")]
    InvalidTopicKey(String),
}

//
// ─── CURSOR ────────────────────────────────────────────────────────────────────
//

/// Position in the curriculum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    #[serde(default)]
    pub chapter_index: usize,
    #[serde(default)]
    pub topic_index: usize,
}

impl Cursor {
    #[must_use]
    pub const fn new(chapter_index: usize, topic_index: usize) -> Self {
        Self {
            chapter_index,
            topic_index,
        }
    }

    #[must_use]
    pub const fn start() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub fn key(self) -> TopicKey {
        TopicKey::new(self.chapter_index, self.topic_index)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter_index, self.topic_index)
    }
}

//
// ─── TOPIC KEY ─────────────────────────────────────────────────────────────────
//

/// `"chapterIndex:topicIndex"` key of the topic progress map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicKey {
    pub chapter: usize,
    pub topic: usize,
}

impl TopicKey {
    #[must_use]
    pub const fn new(chapter: usize, topic: usize) -> Self {
        Self { chapter, topic }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter, self.topic)
    }
}

impl FromStr for TopicKey {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProgressError::InvalidTopicKey(s.to_string());
        let (chapter, topic) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            chapter: chapter.trim().parse().map_err(|_| invalid())?,
            topic: topic.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for TopicKey {
    type Error = ProgressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TopicKey> for String {
    fn from(value: TopicKey) -> Self {
        value.to_string()
    }
}

//
// ─── TOPIC PROGRESS ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    #[serde(default)]
    pub attempted_count: u32,
    #[serde(default)]
    pub correct_count: u32,
    #[serde(default)]
    pub quiz_passed: bool,
}

impl TopicProgress {
    /// `correct / attempted`, or 0 when nothing was attempted.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.attempted_count == 0 {
            0.0
        } else {
            f64::from(self.correct_count) / f64::from(self.attempted_count)
        }
    }
}

/// Derived per-topic view for presentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TopicStatus {
    pub completed: bool,
    pub accuracy: f64,
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// One user's progress through one course, as owned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    course_id: CourseId,
    #[serde(default, rename = "progress")]
    cursor: Cursor,
    #[serde(default)]
    topic_progress: BTreeMap<TopicKey, TopicProgress>,
    #[serde(default)]
    completed: bool,
}

impl ProgressRecord {
    /// Zeroed record used when nothing is known about a course yet.
    #[must_use]
    pub fn empty(course_id: CourseId) -> Self {
        Self {
            course_id,
            cursor: Cursor::start(),
            topic_progress: BTreeMap::new(),
            completed: false,
        }
    }

    /// Rehydrate a record from persisted parts.
    #[must_use]
    pub fn from_parts(
        course_id: CourseId,
        cursor: Cursor,
        topic_progress: BTreeMap<TopicKey, TopicProgress>,
        completed: bool,
    ) -> Self {
        Self {
            course_id,
            cursor,
            topic_progress,
            completed,
        }
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn topic_progress(&self) -> &BTreeMap<TopicKey, TopicProgress> {
        &self.topic_progress
    }

    #[must_use]
    pub fn topic(&self, key: TopicKey) -> Option<&TopicProgress> {
        self.topic_progress.get(&key)
    }

    #[must_use]
    pub fn is_quiz_passed(&self, key: TopicKey) -> bool {
        self.topic(key).is_some_and(|t| t.quiz_passed)
    }

    #[must_use]
    pub fn topic_status(&self, key: TopicKey) -> TopicStatus {
        let entry = self.topic(key).copied().unwrap_or_default();
        TopicStatus {
            completed: entry.quiz_passed,
            accuracy: entry.accuracy(),
        }
    }

    /// Fails unless the record belongs to `expected`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CourseMismatch` for a foreign record.
    pub fn ensure_course(&self, expected: &CourseId) -> Result<(), ProgressError> {
        if &self.course_id == expected {
            Ok(())
        } else {
            Err(ProgressError::CourseMismatch {
                expected: expected.clone(),
                found: self.course_id.clone(),
            })
        }
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    #[must_use]
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Count one answered question against a topic without passing it.
    #[must_use]
    pub fn with_attempt(mut self, key: TopicKey, correct: bool) -> Self {
        let entry = self.topic_progress.entry(key).or_default();
        entry.attempted_count = entry.attempted_count.saturating_add(1);
        if correct {
            entry.correct_count = entry.correct_count.saturating_add(1);
        }
        self
    }

    /// Fold one chapter-quiz result for a topic into the record.
    #[must_use]
    pub fn with_quiz_result(mut self, key: TopicKey, attempted: u32, correct: u32) -> Self {
        let entry = self.topic_progress.entry(key).or_default();
        entry.attempted_count = entry.attempted_count.saturating_add(attempted);
        entry.correct_count = entry.correct_count.saturating_add(correct);
        entry.quiz_passed = true;
        self
    }
}
