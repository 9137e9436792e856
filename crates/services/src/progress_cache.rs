use std::sync::Arc;

use tracing::debug;

use learn_core::{
    model::{CourseId, ProgressRecord, TopicKey, TopicStatus},
    time::Clock,
};
use storage::repository::ProgressRepository;

use crate::error::ProgressCacheError;

/// Local mirror of the last progress record reconciled from the service.
///
/// The only way to change the mirror is `reconcile`, which persists before it
/// replaces the in-memory copy. A failed write leaves both untouched.
pub struct ProgressCache {
    record: ProgressRecord,
    repo: Arc<dyn ProgressRepository>,
    clock: Clock,
}

impl ProgressCache {
    /// Load the persisted record for a course, or start from an empty one.
    ///
    /// # Errors
    ///
    /// Returns `ProgressCacheError::Storage` if the repository cannot be read.
    pub async fn load(
        course_id: &CourseId,
        repo: Arc<dyn ProgressRepository>,
        clock: Clock,
    ) -> Result<Self, ProgressCacheError> {
        let record = match repo.load_progress(course_id).await? {
            Some(record) => {
                record.ensure_course(course_id)?;
                record
            }
            None => ProgressRecord::empty(course_id.clone()),
        };
        Ok(Self { record, repo, clock })
    }

    #[must_use]
    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        self.record.course_id()
    }

    /// Replace the mirror with an authoritative snapshot.
    ///
    /// # Errors
    ///
    /// `Progress` if the snapshot belongs to another course, `Storage` if it
    /// cannot be persisted.
    pub async fn reconcile(&mut self, remote: ProgressRecord) -> Result<&ProgressRecord, ProgressCacheError> {
        remote.ensure_course(self.record.course_id())?;
        self.repo.save_progress(&remote, self.clock.now()).await?;
        debug!(
            course = %remote.course_id(),
            cursor = %remote.cursor(),
            completed = remote.is_completed(),
            "progress reconciled"
        );
        self.record = remote;
        Ok(&self.record)
    }

    #[must_use]
    pub fn topic_status(&self, chapter: usize, topic: usize) -> TopicStatus {
        self.record.topic_status(TopicKey::new(chapter, topic))
    }
}
