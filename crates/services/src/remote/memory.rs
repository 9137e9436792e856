use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use learn_core::model::{CourseId, Cursor, ProgressRecord, TopicKey};

use super::{AnswerReport, ProgressRemote, RemoteError};

/// How the in-memory service answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemoteMode {
    #[default]
    Online,
    /// Every call fails as if the network were down.
    Offline,
    /// Every call fails with a 401.
    AuthExpired,
}

/// Number of calls received per endpoint, including failed ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCalls {
    pub fetch_progress: usize,
    pub update_progress: usize,
    pub submit_answer: usize,
    pub complete_chapter_quiz: usize,
    pub complete_course: usize,
}

#[derive(Default)]
struct RemoteState {
    mode: RemoteMode,
    records: HashMap<CourseId, ProgressRecord>,
    calls: RemoteCalls,
}

/// Progress service kept in process memory, with the same upsert semantics
/// as the real one. Used for offline runs and tests.
#[derive(Clone, Default)]
pub struct InMemoryProgressRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryProgressRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mode(mode: RemoteMode) -> Self {
        let remote = Self::default();
        remote.set_mode(mode);
        remote
    }

    fn lock(&self) -> Result<MutexGuard<'_, RemoteState>, RemoteError> {
        self.state
            .lock()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    pub fn set_mode(&self, mode: RemoteMode) {
        if let Ok(mut state) = self.state.lock() {
            state.mode = mode;
        }
    }

    /// Seed or overwrite the stored record for its course.
    pub fn put_record(&self, record: ProgressRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.records.insert(record.course_id().clone(), record);
        }
    }

    #[must_use]
    pub fn record(&self, course_id: &CourseId) -> Option<ProgressRecord> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.records.get(course_id).cloned())
    }

    #[must_use]
    pub fn calls(&self) -> RemoteCalls {
        self.state.lock().map(|s| s.calls).unwrap_or_default()
    }

    /// Count the call, then fail according to the mode.
    fn enter(&self, count: impl FnOnce(&mut RemoteCalls)) -> Result<MutexGuard<'_, RemoteState>, RemoteError> {
        let mut state = self.lock()?;
        count(&mut state.calls);
        match state.mode {
            RemoteMode::Online => Ok(state),
            RemoteMode::Offline => Err(RemoteError::Unavailable("offline".into())),
            RemoteMode::AuthExpired => Err(RemoteError::AuthExpired),
        }
    }
}

fn upsert(
    state: &mut RemoteState,
    course_id: &CourseId,
    change: impl FnOnce(ProgressRecord) -> ProgressRecord,
) -> ProgressRecord {
    let current = state
        .records
        .remove(course_id)
        .unwrap_or_else(|| ProgressRecord::empty(course_id.clone()));
    let updated = change(current);
    state.records.insert(course_id.clone(), updated.clone());
    updated
}

#[async_trait]
impl ProgressRemote for InMemoryProgressRemote {
    async fn fetch_progress(&self, course_id: &CourseId) -> Result<Option<ProgressRecord>, RemoteError> {
        let state = self.enter(|c| c.fetch_progress += 1)?;
        Ok(state.records.get(course_id).cloned())
    }

    async fn update_progress(
        &self,
        course_id: &CourseId,
        cursor: Cursor,
    ) -> Result<ProgressRecord, RemoteError> {
        let mut state = self.enter(|c| c.update_progress += 1)?;
        Ok(upsert(&mut state, course_id, |r| r.with_cursor(cursor)))
    }

    async fn submit_answer(&self, report: &AnswerReport) -> Result<(), RemoteError> {
        let mut state = self.enter(|c| c.submit_answer += 1)?;
        let key = TopicKey::new(report.chapter_index, report.topic_index);
        let correct = report.selected_option_index == report.correct_option_index;
        upsert(&mut state, &report.course_id, |r| r.with_attempt(key, correct));
        Ok(())
    }

    async fn complete_chapter_quiz(&self, course_id: &CourseId, cursor: Cursor) -> Result<(), RemoteError> {
        let mut state = self.enter(|c| c.complete_chapter_quiz += 1)?;
        upsert(&mut state, course_id, |r| r.with_quiz_result(cursor.key(), 0, 0));
        Ok(())
    }

    async fn complete_course(&self, course_id: &CourseId) -> Result<ProgressRecord, RemoteError> {
        let mut state = self.enter(|c| c.complete_course += 1)?;
        Ok(upsert(&mut state, course_id, |r| r.with_completed(true)))
    }
}
