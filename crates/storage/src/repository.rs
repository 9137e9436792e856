use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learn_core::model::{CourseId, Cursor, ProgressRecord, QuizSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A quiz snapshot together with the time it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredQuiz {
    pub snapshot: QuizSnapshot,
    pub saved_at: DateTime<Utc>,
}

/// Durable mirror of the last reconciled progress record per course.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the cached record for a course, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn load_progress(&self, course_id: &CourseId) -> Result<Option<ProgressRecord>, StorageError>;

    /// Replace the cached record for the record's course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn save_progress(
        &self,
        record: &ProgressRecord,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}

/// Short-lived store for the quiz in progress, keyed by its return cursor.
///
/// At most one snapshot is kept per course; saving a new one replaces any
/// other.
#[async_trait]
pub trait QuizSessionRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save_quiz(&self, snapshot: &QuizSnapshot, saved_at: DateTime<Utc>) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or the snapshot
    /// cannot be decoded.
    async fn load_quiz(&self, course_id: &CourseId) -> Result<Option<StoredQuiz>, StorageError>;

    /// Remove the snapshot for the given return cursor. Missing rows are fine.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn clear_quiz(&self, course_id: &CourseId, return_to: Cursor) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<CourseId, ProgressRecord>>>,
    quizzes: Arc<Mutex<HashMap<CourseId, StoredQuiz>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(&self, course_id: &CourseId) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(course_id).cloned())
    }

    async fn save_progress(
        &self,
        record: &ProgressRecord,
        _updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.course_id().clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl QuizSessionRepository for InMemoryRepository {
    async fn save_quiz(&self, snapshot: &QuizSnapshot, saved_at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            snapshot.course_id.clone(),
            StoredQuiz {
                snapshot: snapshot.clone(),
                saved_at,
            },
        );
        Ok(())
    }

    async fn load_quiz(&self, course_id: &CourseId) -> Result<Option<StoredQuiz>, StorageError> {
        let guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(course_id).cloned())
    }

    async fn clear_quiz(&self, course_id: &CourseId, return_to: Cursor) -> Result<(), StorageError> {
        let mut guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard
            .get(course_id)
            .is_some_and(|stored| stored.snapshot.return_to.cursor == return_to)
        {
            guard.remove(course_id);
        }
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub quizzes: Arc<dyn QuizSessionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let quizzes: Arc<dyn QuizSessionRepository> = Arc::new(repo);
        Self { progress, quizzes }
    }
}
