//! Cursor over the curriculum and the single entry point for user actions.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use learn_core::{
    completion::MasterySummary,
    curriculum::CurriculumStore,
    model::{
        AnswerFeedback, Course, Cursor, ProgressRecord, QuestionState, QuizSession, Topic,
        TopicStatus,
    },
    time::Clock,
};
use storage::repository::{QuizSessionRepository, Storage};

use crate::completion::{CompletionCheck, CompletionEvaluator, Evaluation};
use crate::error::{CompletionError, NavigationError, QuizEngineError, Redirect};
use crate::events::{EventBus, LearningEvent};
use crate::progress_cache::ProgressCache;
use crate::quiz_engine::{AdvanceResult, QuizEngine, QuizPass};
use crate::remote::{ProgressRemote, RemoteError};
use crate::reports::ReportDispatcher;

/// Collaborators shared by every course session.
#[derive(Clone)]
pub struct LearningContext {
    pub storage: Storage,
    pub remote: Arc<dyn ProgressRemote>,
    pub clock: Clock,
    pub events: EventBus,
}

/// Where the controller stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Viewing(Cursor),
    /// A chapter quiz is running; it returns to `return_to` when it ends.
    AwaitingQuiz { return_to: Cursor },
    /// The course is complete; `next` only redirects to certification.
    Completed(Cursor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    Advanced(Cursor),
    /// Last topic of the course; completion was evaluated but not reached.
    EndOfCourse,
    /// This step completed the course.
    CourseCompleted,
    QuizOpened { chapter_index: usize, questions: usize },
    Redirect(Redirect),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizAdvance {
    NextQuestion { question_index: usize },
    Passed { cursor: Cursor, course_completed: bool },
}

/// Owns the progress cache and the running quiz for one active course.
pub struct NavigationController {
    curriculum: CurriculumStore,
    cache: ProgressCache,
    cursor: Cursor,
    quiz: Option<QuizEngine>,
    evaluator: CompletionEvaluator,
    reports: ReportDispatcher,
    remote: Arc<dyn ProgressRemote>,
    quizzes: Arc<dyn QuizSessionRepository>,
    clock: Clock,
    events: EventBus,
}

impl NavigationController {
    /// Parse and validate a course, then open it.
    ///
    /// # Errors
    ///
    /// `MalformedCurriculum` (see `NavigationError::redirect`) for invalid
    /// course JSON, otherwise as `open`.
    pub async fn open_json(raw: &str, ctx: LearningContext) -> Result<Self, NavigationError> {
        let course = Course::from_json(raw)?;
        Self::open(course, ctx).await
    }

    /// Load the cached progress, reconcile it with the service, restore the
    /// cursor and any saved quiz, and check completion.
    ///
    /// An unreachable service is tolerated; the session starts from the cache.
    ///
    /// # Errors
    ///
    /// `Remote(AuthExpired)` if the service rejects the credentials, `Cache`
    /// if the local store cannot be read or written.
    pub async fn open(course: Course, ctx: LearningContext) -> Result<Self, NavigationError> {
        let curriculum = CurriculumStore::new(course);
        let course_id = curriculum.course_id().clone();
        let mut cache = ProgressCache::load(&course_id, ctx.storage.progress.clone(), ctx.clock).await?;

        match ctx.remote.fetch_progress(&course_id).await {
            Ok(remote) => {
                let remote = remote.unwrap_or_else(|| ProgressRecord::empty(course_id.clone()));
                cache.reconcile(remote).await?;
                ctx.events.emit(LearningEvent::ProgressReconciled);
            }
            Err(RemoteError::AuthExpired) => {
                ctx.events.emit(LearningEvent::AuthExpired);
                return Err(NavigationError::Remote(RemoteError::AuthExpired));
            }
            Err(err) => {
                warn!(course = %course_id, error = %err, "progress fetch failed; using cache");
                ctx.events.emit(LearningEvent::Degraded {
                    operation: "fetch_progress",
                });
            }
        }

        let quiz = QuizEngine::resume(&curriculum, ctx.storage.quizzes.clone(), ctx.clock).await;
        let cursor = match &quiz {
            Some(engine) => {
                info!(chapter = engine.session().chapter_index(), "resuming saved chapter quiz");
                engine.session().return_to().cursor
            }
            None => curriculum.clamp(cache.record().cursor()),
        };

        let mut controller = Self {
            reports: ReportDispatcher::new(ctx.remote.clone(), ctx.events.clone()),
            curriculum,
            cache,
            cursor,
            quiz,
            evaluator: CompletionEvaluator::new(),
            remote: ctx.remote,
            quizzes: ctx.storage.quizzes,
            clock: ctx.clock,
            events: ctx.events,
        };
        controller.check_completion().await?;
        info!(course = %course_id, %cursor, "course opened");
        Ok(controller)
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn state(&self) -> NavState {
        match &self.quiz {
            Some(engine) => NavState::AwaitingQuiz {
                return_to: engine.session().return_to().cursor,
            },
            None if self.cache.record().is_completed() => NavState::Completed(self.cursor),
            None => NavState::Viewing(self.cursor),
        }
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[must_use]
    pub fn curriculum(&self) -> &CurriculumStore {
        &self.curriculum
    }

    #[must_use]
    pub fn current_topic(&self) -> Option<&Topic> {
        self.curriculum
            .topic_at(self.cursor.chapter_index, self.cursor.topic_index)
            .ok()
    }

    #[must_use]
    pub fn record(&self) -> &ProgressRecord {
        self.cache.record()
    }

    #[must_use]
    pub fn topic_status(&self, chapter: usize, topic: usize) -> TopicStatus {
        self.cache.topic_status(chapter, topic)
    }

    #[must_use]
    pub fn mastery(&self) -> MasterySummary {
        MasterySummary::compute(self.cache.record(), &self.curriculum)
    }

    #[must_use]
    pub fn quiz(&self) -> Option<&QuizSession> {
        self.quiz.as_ref().map(QuizEngine::session)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LearningEvent> {
        self.events.subscribe()
    }

    /// Wait for answer reports still in flight.
    pub async fn flush_reports(&mut self) -> bool {
        self.reports.flush().await
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Step forward.
    ///
    /// At the last topic of a chapter with an unpassed quiz this opens the
    /// quiz instead. Otherwise the service records the current position,
    /// completion is evaluated and the cursor moves on.
    ///
    /// # Errors
    ///
    /// `QuizInProgress` while a quiz runs, `Remote(AuthExpired)` when the
    /// credentials were rejected (the cursor does not move).
    pub async fn next(&mut self) -> Result<NextOutcome, NavigationError> {
        self.ensure_no_quiz()?;
        if self.cache.record().is_completed() {
            return Ok(NextOutcome::Redirect(Redirect::Certification));
        }

        let chapter_index = self.cursor.chapter_index;
        if self.curriculum.is_chapter_end(self.cursor)? && self.chapter_needs_quiz(chapter_index)? {
            let engine = QuizEngine::open(&self.curriculum, self.cursor, self.quizzes.clone(), self.clock).await?;
            let questions = engine.session().total();
            self.quiz = Some(engine);
            self.events.emit(LearningEvent::QuizOpened {
                chapter_index,
                questions,
            });
            return Ok(NextOutcome::QuizOpened {
                chapter_index,
                questions,
            });
        }

        self.record_position(self.cursor).await?;
        let check = self.check_completion().await?;
        match self.curriculum.next_cursor(self.cursor)? {
            Some(next) => {
                self.move_to(next);
                Ok(NextOutcome::Advanced(next))
            }
            None if check == Some(CompletionCheck::Completed) => Ok(NextOutcome::CourseCompleted),
            None => Ok(NextOutcome::EndOfCourse),
        }
    }

    /// Step back, clamped at the first topic. Never opens a quiz.
    ///
    /// # Errors
    ///
    /// `QuizInProgress` while a quiz runs.
    pub fn prev(&mut self) -> Result<Cursor, NavigationError> {
        self.ensure_no_quiz()?;
        let prev = self.curriculum.prev_cursor(self.cursor)?;
        self.move_to(prev);
        Ok(prev)
    }

    /// Jump to any topic of the course. Never opens a quiz.
    ///
    /// # Errors
    ///
    /// `QuizInProgress` while a quiz runs, `Curriculum(OutOfRange)` for a
    /// cursor the course does not have.
    pub fn go_to(&mut self, cursor: Cursor) -> Result<Cursor, NavigationError> {
        self.ensure_no_quiz()?;
        self.curriculum
            .topic_at(cursor.chapter_index, cursor.topic_index)?;
        self.move_to(cursor);
        Ok(cursor)
    }

    //
    // ─── QUIZ ──────────────────────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// `NoActiveQuiz` outside a quiz; `Quiz` for a rejected selection.
    pub async fn select_option(&mut self, option: usize) -> Result<QuestionState, NavigationError> {
        let engine = self.quiz.as_mut().ok_or(NavigationError::NoActiveQuiz)?;
        Ok(engine.select(option).await?.clone())
    }

    /// # Errors
    ///
    /// `NoActiveQuiz` outside a quiz; `Quiz(NoSelection)` before selecting.
    pub async fn validate_answer(&mut self) -> Result<AnswerFeedback, NavigationError> {
        let engine = self.quiz.as_mut().ok_or(NavigationError::NoActiveQuiz)?;
        let validation = engine.validate(&mut self.reports).await?;
        if validation.newly_revealed {
            self.events
                .emit(LearningEvent::AnswerRevealed(validation.feedback.clone()));
        }
        Ok(validation.feedback)
    }

    /// Move through the quiz. After the last question the pass is settled
    /// with the service, course completion is requested, and only then is
    /// the outcome folded into the cache and the cursor moved past the
    /// chapter.
    ///
    /// # Errors
    ///
    /// `NoActiveQuiz` outside a quiz, `Quiz(NotRevealed)` before validating,
    /// `Quiz(Remote(AuthExpired))` or `Remote(AuthExpired)` when the
    /// credentials were rejected. On error the quiz stays open on its last
    /// answer and local progress is unchanged; calling again retries.
    pub async fn advance_quiz(&mut self) -> Result<QuizAdvance, NavigationError> {
        let engine = self.quiz.as_mut().ok_or(NavigationError::NoActiveQuiz)?;
        let result = match engine
            .advance(&self.cache, self.remote.as_ref(), &mut self.reports)
            .await
        {
            Ok(result) => result,
            Err(QuizEngineError::Remote(RemoteError::AuthExpired)) => {
                self.events.emit(LearningEvent::AuthExpired);
                return Err(QuizEngineError::Remote(RemoteError::AuthExpired).into());
            }
            Err(err) => return Err(err.into()),
        };

        let QuizPass {
            return_to,
            record,
            synced,
        } = match result {
            AdvanceResult::Next { question_index } => {
                return Ok(QuizAdvance::NextQuestion { question_index });
            }
            AdvanceResult::Passed(pass) => pass,
        };
        if !synced {
            self.events.emit(LearningEvent::Degraded {
                operation: "complete_chapter_quiz",
            });
        }

        let (check, confirmed) = match self
            .evaluator
            .request(&self.curriculum, &record, self.remote.as_ref())
            .await
        {
            Ok(Evaluation { check, record }) => (Some(check), record),
            Err(err) => {
                self.degrade("complete_course", err)?;
                (None, None)
            }
        };

        if let Some(engine) = self.quiz.take() {
            engine.finish().await;
        }
        self.events.emit(LearningEvent::QuizFinished {
            chapter_index: return_to.cursor.chapter_index,
        });
        self.cache.reconcile(confirmed.unwrap_or(record)).await?;
        self.events.emit(LearningEvent::ProgressReconciled);
        let course_completed = check == Some(CompletionCheck::Completed);
        if course_completed {
            self.events.emit(LearningEvent::CourseCompleted);
        }

        let cursor = self
            .curriculum
            .next_cursor(return_to.cursor)?
            .unwrap_or(return_to.cursor);
        self.move_to(cursor);
        Ok(QuizAdvance::Passed {
            cursor,
            course_completed,
        })
    }

    /// Leave the running quiz. Progress and cursor stay as they were; answer
    /// reports still in flight finish on their own and no longer count
    /// towards the next quiz.
    ///
    /// # Errors
    ///
    /// `NoActiveQuiz` outside a quiz, `Quiz(AbortNotConfirmed)` without
    /// confirmation.
    pub async fn abort_quiz(&mut self, confirmed: bool) -> Result<Cursor, NavigationError> {
        let engine = self.quiz.as_ref().ok_or(NavigationError::NoActiveQuiz)?;
        let return_to = engine.abort(confirmed).await?;
        self.quiz = None;
        let abandoned = self.reports.detach();
        if abandoned > 0 {
            debug!(abandoned, "answer reports of the aborted quiz left running");
        }
        self.events.emit(LearningEvent::QuizAborted {
            chapter_index: return_to.cursor.chapter_index,
        });
        self.move_to(return_to.cursor);
        Ok(return_to.cursor)
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn ensure_no_quiz(&self) -> Result<(), NavigationError> {
        if self.quiz.is_some() {
            return Err(NavigationError::QuizInProgress);
        }
        Ok(())
    }

    fn move_to(&mut self, cursor: Cursor) {
        if self.cursor != cursor {
            debug!(from = %self.cursor, to = %cursor, "cursor moved");
            self.cursor = cursor;
            self.events.emit(LearningEvent::CursorMoved(cursor));
        }
    }

    /// A chapter needs its quiz when it has questions and some quiz-bearing
    /// topic in it is not passed yet.
    fn chapter_needs_quiz(&self, chapter_index: usize) -> Result<bool, NavigationError> {
        let chapter = self.curriculum.chapter_at(chapter_index)?;
        let record = self.cache.record();
        Ok(chapter
            .topics()
            .iter()
            .enumerate()
            .filter(|(_, topic)| topic.has_quiz())
            .any(|(topic_index, _)| !record.is_quiz_passed(Cursor::new(chapter_index, topic_index).key())))
    }

    async fn record_position(&mut self, cursor: Cursor) -> Result<(), NavigationError> {
        match self
            .remote
            .update_progress(self.curriculum.course_id(), cursor)
            .await
        {
            Ok(remote) => {
                self.cache.reconcile(remote).await?;
                self.events.emit(LearningEvent::ProgressReconciled);
                Ok(())
            }
            Err(err) => self.degrade("update_progress", err),
        }
    }

    /// Run the completion evaluator. Unreachable-service failures are
    /// swallowed; `None` means the check could not be made.
    async fn check_completion(&mut self) -> Result<Option<CompletionCheck>, NavigationError> {
        match self
            .evaluator
            .evaluate(&self.curriculum, &mut self.cache, self.remote.as_ref())
            .await
        {
            Ok(check) => {
                if check == CompletionCheck::Completed {
                    self.events.emit(LearningEvent::CourseCompleted);
                }
                Ok(Some(check))
            }
            Err(CompletionError::Remote(err)) => self.degrade("complete_course", err).map(|()| None),
            Err(err) => Err(err.into()),
        }
    }

    fn degrade(&self, operation: &'static str, err: RemoteError) -> Result<(), NavigationError> {
        if err.is_auth_expired() {
            self.events.emit(LearningEvent::AuthExpired);
            return Err(NavigationError::Remote(err));
        }
        warn!(course = %self.curriculum.course_id(), operation, error = %err, "remote call failed; continuing from cache");
        self.events.emit(LearningEvent::Degraded { operation });
        Ok(())
    }
}
