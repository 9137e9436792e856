use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use learn_core::{
    curriculum::CurriculumStore,
    model::{
        Cursor, ProgressRecord, QuestionState, QuizError, QuizSession, QuizSnapshot, ReturnCursor,
        Validation,
    },
    time::Clock,
};
use storage::repository::QuizSessionRepository;

use crate::error::QuizEngineError;
use crate::progress_cache::ProgressCache;
use crate::remote::{AnswerReport, ProgressRemote, RemoteError};
use crate::reports::ReportDispatcher;

/// Saved quizzes older than this are discarded instead of resumed.
pub const SNAPSHOT_MAX_AGE_HOURS: i64 = 24;

//
// ─── OUTCOMES ──────────────────────────────────────────────────────────────────
//

/// A chapter quiz whose last answer was accepted by the service side.
///
/// `record` is what the cache should adopt: the service's record when every
/// call reached it, otherwise the cached record with every topic of the
/// chapter credited locally. `synced` tells the two apart. Nothing is
/// committed until `QuizEngine::finish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizPass {
    pub return_to: ReturnCursor,
    pub record: ProgressRecord,
    pub synced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceResult {
    Next { question_index: usize },
    Passed(QuizPass),
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Drives one chapter quiz and keeps its snapshot in storage.
///
/// Snapshot writes are best effort: a failure is logged and the quiz goes on.
pub struct QuizEngine {
    session: QuizSession,
    quizzes: Arc<dyn QuizSessionRepository>,
    clock: Clock,
}

impl QuizEngine {
    /// Start the quiz for the chapter of `return_to`.
    ///
    /// # Errors
    ///
    /// `Curriculum` for an unknown chapter, `Quiz(EmptyQuiz)` when the chapter
    /// has no questions.
    pub async fn open(
        curriculum: &CurriculumStore,
        return_to: Cursor,
        quizzes: Arc<dyn QuizSessionRepository>,
        clock: Clock,
    ) -> Result<Self, QuizEngineError> {
        let chapter = curriculum.chapter_at(return_to.chapter_index)?;
        let questions = curriculum.aggregated_quiz_for(return_to.chapter_index)?;
        let session = QuizSession::new(
            curriculum.course_id().clone(),
            ReturnCursor {
                cursor: return_to,
                chapter_title: chapter.title().to_owned(),
            },
            chapter.topics().len(),
            questions,
        )?;
        info!(
            course = %curriculum.course_id(),
            chapter = return_to.chapter_index,
            questions = session.total(),
            "chapter quiz opened"
        );
        let engine = Self {
            session,
            quizzes,
            clock,
        };
        engine.persist().await;
        Ok(engine)
    }

    /// Pick up a saved quiz for the course, if a fresh and consistent one
    /// exists. Stale or mismatched snapshots are removed.
    pub async fn resume(
        curriculum: &CurriculumStore,
        quizzes: Arc<dyn QuizSessionRepository>,
        clock: Clock,
    ) -> Option<Self> {
        let stored = match quizzes.load_quiz(curriculum.course_id()).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "could not read saved quiz");
                return None;
            }
        };
        let return_to = stored.snapshot.return_to.cursor;

        let restored = if clock.is_expired(stored.saved_at, Duration::hours(SNAPSHOT_MAX_AGE_HOURS)) {
            debug!(cursor = %return_to, "saved quiz expired");
            None
        } else {
            restore(curriculum, stored.snapshot)
        };

        match restored {
            Some(session) => Some(Self {
                session,
                quizzes,
                clock,
            }),
            None => {
                if let Err(err) = quizzes.clear_quiz(curriculum.course_id(), return_to).await {
                    warn!(error = %err, "could not discard saved quiz");
                }
                None
            }
        }
    }

    #[must_use]
    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    /// # Errors
    ///
    /// See `QuizSession::select`.
    pub async fn select(&mut self, option: usize) -> Result<&QuestionState, QuizEngineError> {
        self.session.select(option)?;
        self.persist().await;
        Ok(self.session.state())
    }

    /// Reveal the current answer. The first reveal of a question queues an
    /// answer report; repeats only return the same feedback.
    ///
    /// # Errors
    ///
    /// See `QuizSession::validate`.
    pub async fn validate(&mut self, reports: &mut ReportDispatcher) -> Result<Validation, QuizEngineError> {
        let validation = self.session.validate()?;
        if validation.newly_revealed {
            let feedback = &validation.feedback;
            reports.submit_answer(AnswerReport {
                course_id: self.session.course_id().clone(),
                chapter_index: self.session.chapter_index(),
                topic_index: feedback.topic_index,
                question_index: feedback.question_index,
                selected_option_index: feedback.selected,
                correct_option_index: feedback.correct_option,
            });
            self.persist().await;
        }
        Ok(validation)
    }

    /// Move to the next question, or settle the quiz with the service after
    /// the last one.
    ///
    /// Settling waits for outstanding answer reports, marks each topic of the
    /// chapter complete and records the return position. The session itself
    /// is left on its last question until `finish`, so a rejected call can
    /// be retried. Only an `AuthExpired` reply is an error; other failures
    /// are tolerated and reflected in `synced`.
    ///
    /// # Errors
    ///
    /// `Quiz(NotRevealed)` before the answer is shown, `Remote(AuthExpired)`
    /// when the credentials were rejected.
    pub async fn advance(
        &mut self,
        cache: &ProgressCache,
        remote: &dyn ProgressRemote,
        reports: &mut ReportDispatcher,
    ) -> Result<AdvanceResult, QuizEngineError> {
        if !matches!(self.session.state(), QuestionState::Revealed(_)) {
            return Err(QuizError::NotRevealed.into());
        }
        if !self.session.is_last() {
            self.session.advance()?;
            self.persist().await;
            return Ok(AdvanceResult::Next {
                question_index: self.session.question_index(),
            });
        }

        let mut synced = reports.flush().await;
        synced &= self.complete_topics(remote).await?;
        let return_to = self.session.return_to().clone();
        let confirmed = if synced {
            self.record_return(remote, return_to.cursor).await?
        } else {
            None
        };
        let synced = confirmed.is_some();
        let record = confirmed.unwrap_or_else(|| self.session.apply_to(cache.record().clone()));
        Ok(AdvanceResult::Passed(QuizPass {
            return_to,
            record,
            synced,
        }))
    }

    /// Close a settled quiz and drop its snapshot.
    pub async fn finish(mut self) {
        if let Err(err) = self.session.advance() {
            debug!(error = %err, "quiz closed before its last step");
        }
        self.clear().await;
        info!(chapter = self.session.chapter_index(), "chapter quiz passed");
    }

    /// Leave the quiz without crediting anything and return where it was
    /// opened from.
    ///
    /// # Errors
    ///
    /// `AbortNotConfirmed` unless the user confirmed.
    pub async fn abort(&self, confirmed: bool) -> Result<ReturnCursor, QuizEngineError> {
        if !confirmed {
            return Err(QuizEngineError::AbortNotConfirmed);
        }
        let return_to = self.session.return_to().clone();
        self.clear().await;
        info!(chapter = return_to.cursor.chapter_index, "chapter quiz aborted");
        Ok(return_to)
    }

    async fn complete_topics(&self, remote: &dyn ProgressRemote) -> Result<bool, QuizEngineError> {
        let course_id = self.session.course_id();
        let chapter = self.session.chapter_index();
        let mut synced = true;
        for topic in 0..self.session.topic_count() {
            let cursor = Cursor::new(chapter, topic);
            match remote.complete_chapter_quiz(course_id, cursor).await {
                Ok(()) => {}
                Err(RemoteError::AuthExpired) => {
                    return Err(QuizEngineError::Remote(RemoteError::AuthExpired));
                }
                Err(err) => {
                    warn!(%cursor, error = %err, "quiz completion not recorded");
                    synced = false;
                }
            }
        }
        Ok(synced)
    }

    async fn record_return(
        &self,
        remote: &dyn ProgressRemote,
        cursor: Cursor,
    ) -> Result<Option<ProgressRecord>, QuizEngineError> {
        match remote.update_progress(self.session.course_id(), cursor).await {
            Ok(record) => Ok(Some(record)),
            Err(RemoteError::AuthExpired) => Err(QuizEngineError::Remote(RemoteError::AuthExpired)),
            Err(err) => {
                warn!(%cursor, error = %err, "progress update after quiz failed; keeping local credit");
                Ok(None)
            }
        }
    }

    async fn persist(&self) {
        let snapshot = self.session.snapshot();
        if let Err(err) = self.quizzes.save_quiz(&snapshot, self.clock.now()).await {
            warn!(error = %err, "could not save quiz progress");
        }
    }

    async fn clear(&self) {
        let return_to = self.session.return_to().cursor;
        if let Err(err) = self
            .quizzes
            .clear_quiz(self.session.course_id(), return_to)
            .await
        {
            warn!(error = %err, "could not clear saved quiz");
        }
    }
}

fn restore(curriculum: &CurriculumStore, snapshot: QuizSnapshot) -> Option<QuizSession> {
    let cursor = snapshot.return_to.cursor;
    if !curriculum.contains(cursor) || snapshot.course_id != *curriculum.course_id() {
        return None;
    }
    let chapter = curriculum.chapter_at(cursor.chapter_index).ok()?;
    let questions = curriculum.aggregated_quiz_for(cursor.chapter_index).ok()?;
    match QuizSession::restore(snapshot, chapter.topics().len(), questions) {
        Ok(session) => Some(session),
        Err(err) => {
            debug!(error = %err, "saved quiz no longer matches the course");
            None
        }
    }
}
