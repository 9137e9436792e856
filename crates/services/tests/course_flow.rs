use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use learn_core::completion::is_eligible;
use learn_core::model::{CourseId, Cursor, ProgressRecord, QuestionState, TopicKey};
use learn_core::time::fixed_clock;
use services::{
    AnswerReport, EventBus, InMemoryProgressRemote, LearningContext, LearningEvent, NavState,
    NavigationController, NavigationError, NextOutcome, ProgressRemote, QuizAdvance, Redirect,
    RemoteError, RemoteMode,
};
use storage::repository::Storage;

const TWO_TOPIC_COURSE: &str = r#"{
    "_id": "rust-101",
    "title": "Rust 101",
    "chapters": [{
        "chapterTitle": "Basics",
        "topics": [
            {
                "title": "Bindings",
                "content": {
                    "description": "let and mut",
                    "sections": [{ "type": "code", "code": "let x = 1;" }]
                },
                "quiz": { "questions": [
                    { "question": "Immutable by default?", "options": ["yes", "no"], "correctOptionIndex": 0 }
                ] }
            },
            {
                "title": "Functions",
                "content": { "description": "fn items" },
                "quiz": { "questions": [
                    { "question": "Keyword?", "options": ["func", "fn"], "correctOptionIndex": "1",
                      "explanation": "Functions are declared with fn." }
                ] }
            }
        ]
    }]
}"#;

const QUIZLESS_FIRST_CHAPTER: &str = r#"{
    "_id": "rust-102",
    "title": "Rust 102",
    "chapters": [
        { "chapterTitle": "Welcome", "topics": [{ "title": "Setup" }] },
        { "chapterTitle": "Ownership", "topics": [{
            "title": "Moves",
            "quiz": { "questions": [
                { "question": "Moved?", "options": ["a", "b"], "correctOptionIndex": 1 }
            ] }
        }] }
    ]
}"#;

const THREE_CHAPTERS: &str = r#"{
    "_id": "rust-103",
    "title": "Rust 103",
    "chapters": [
        { "chapterTitle": "Moves", "topics": [{
            "title": "Move semantics",
            "quiz": { "questions": [{ "question": "Copy?", "options": ["a", "b"], "correctOptionIndex": 1 }] }
        }] },
        { "chapterTitle": "Borrows", "topics": [{
            "title": "References",
            "quiz": { "questions": [{ "question": "&mut?", "options": ["a", "b"], "correctOptionIndex": 0 }] }
        }] },
        { "chapterTitle": "Recap", "topics": [{ "title": "Summary" }] }
    ]
}"#;

struct Harness {
    storage: Storage,
    remote: InMemoryProgressRemote,
    events: EventBus,
}

impl Harness {
    fn new() -> Self {
        Self {
            storage: Storage::in_memory(),
            remote: InMemoryProgressRemote::new(),
            events: EventBus::default(),
        }
    }

    fn context(&self) -> LearningContext {
        self.context_with(Arc::new(self.remote.clone()))
    }

    fn context_with(&self, remote: Arc<dyn ProgressRemote>) -> LearningContext {
        LearningContext {
            storage: self.storage.clone(),
            remote,
            clock: fixed_clock(),
            events: self.events.clone(),
        }
    }

    async fn open(&self, course: &str) -> NavigationController {
        NavigationController::open_json(course, self.context())
            .await
            .unwrap()
    }
}

/// Accepts answers and chapter completions but answers 401 on the chosen
/// follow-up endpoints.
#[derive(Clone, Default)]
struct PartialExpiry {
    inner: InMemoryProgressRemote,
    reject_update: Arc<AtomicBool>,
    reject_completion: Arc<AtomicBool>,
}

impl PartialExpiry {
    fn new(inner: InMemoryProgressRemote) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    fn rejected(flag: &AtomicBool) -> Result<(), RemoteError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RemoteError::AuthExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressRemote for PartialExpiry {
    async fn fetch_progress(&self, course_id: &CourseId) -> Result<Option<ProgressRecord>, RemoteError> {
        self.inner.fetch_progress(course_id).await
    }

    async fn update_progress(&self, course_id: &CourseId, cursor: Cursor) -> Result<ProgressRecord, RemoteError> {
        Self::rejected(&self.reject_update)?;
        self.inner.update_progress(course_id, cursor).await
    }

    async fn submit_answer(&self, report: &AnswerReport) -> Result<(), RemoteError> {
        self.inner.submit_answer(report).await
    }

    async fn complete_chapter_quiz(&self, course_id: &CourseId, cursor: Cursor) -> Result<(), RemoteError> {
        self.inner.complete_chapter_quiz(course_id, cursor).await
    }

    async fn complete_course(&self, course_id: &CourseId) -> Result<ProgressRecord, RemoteError> {
        Self::rejected(&self.reject_completion)?;
        self.inner.complete_course(course_id).await
    }
}

/// Opens the single-topic Ownership quiz of `QUIZLESS_FIRST_CHAPTER` and
/// reveals the correct answer.
async fn reveal_ownership_quiz(h: &Harness, remote: &PartialExpiry) -> NavigationController {
    let mut nav = NavigationController::open_json(QUIZLESS_FIRST_CHAPTER, h.context_with(Arc::new(remote.clone())))
        .await
        .unwrap();
    nav.go_to(Cursor::new(1, 0)).unwrap();
    assert!(matches!(nav.next().await.unwrap(), NextOutcome::QuizOpened { .. }));
    nav.select_option(1).await.unwrap();
    nav.validate_answer().await.unwrap();
    nav
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<LearningEvent>) -> Vec<LearningEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn answer(nav: &mut NavigationController, option: usize) -> QuizAdvance {
    nav.select_option(option).await.unwrap();
    nav.validate_answer().await.unwrap();
    nav.advance_quiz().await.unwrap()
}

#[tokio::test]
async fn passing_the_chapter_quiz_completes_the_course() {
    let h = Harness::new();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    assert_eq!(nav.state(), NavState::Viewing(Cursor::start()));

    assert_eq!(nav.next().await.unwrap(), NextOutcome::Advanced(Cursor::new(0, 1)));
    assert_eq!(
        nav.next().await.unwrap(),
        NextOutcome::QuizOpened {
            chapter_index: 0,
            questions: 2
        }
    );
    assert_eq!(
        nav.state(),
        NavState::AwaitingQuiz {
            return_to: Cursor::new(0, 1)
        }
    );

    assert_eq!(answer(&mut nav, 0).await, QuizAdvance::NextQuestion { question_index: 1 });
    assert_eq!(
        answer(&mut nav, 1).await,
        QuizAdvance::Passed {
            cursor: Cursor::new(0, 1),
            course_completed: true
        }
    );

    let record = nav.record();
    assert!(record.is_quiz_passed(TopicKey::new(0, 0)));
    assert!(record.is_quiz_passed(TopicKey::new(0, 1)));
    assert!(is_eligible(record, nav.curriculum()));
    assert!(record.is_completed());
    assert_eq!(nav.state(), NavState::Completed(Cursor::new(0, 1)));

    let mastery = nav.mastery();
    assert_eq!(mastery.modules_label(), "2/2");
    assert_eq!((mastery.progress_percent, mastery.accuracy_percent), (100, 100));

    assert_eq!(nav.next().await.unwrap(), NextOutcome::Redirect(Redirect::Certification));
    assert_eq!(h.remote.calls().complete_course, 1);
}

#[tokio::test]
async fn aborting_leaves_progress_untouched() {
    let h = Harness::new();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    nav.next().await.unwrap();
    nav.next().await.unwrap();
    let before = nav.record().clone();

    nav.select_option(1).await.unwrap();
    nav.validate_answer().await.unwrap();
    let err = nav.abort_quiz(false).await.unwrap_err();
    assert!(matches!(err, NavigationError::Quiz(_)));
    assert!(nav.quiz().is_some());

    assert_eq!(nav.abort_quiz(true).await.unwrap(), Cursor::new(0, 1));
    assert!(nav.quiz().is_none());
    assert_eq!(nav.record(), &before);

    let stored = h
        .storage
        .progress
        .load_progress(before.course_id())
        .await
        .unwrap();
    assert_eq!(stored.as_ref(), Some(&before));
    let saved_quiz = h.storage.quizzes.load_quiz(before.course_id()).await.unwrap();
    assert!(saved_quiz.is_none());
}

#[tokio::test]
async fn quizless_chapter_goes_straight_to_progress_update() {
    let h = Harness::new();
    let mut nav = h.open(QUIZLESS_FIRST_CHAPTER).await;

    assert_eq!(nav.next().await.unwrap(), NextOutcome::Advanced(Cursor::new(1, 0)));
    assert!(nav.quiz().is_none());
    assert_eq!(h.remote.calls().update_progress, 1);
}

#[tokio::test]
async fn finishing_the_last_quiz_completes_in_place() {
    let h = Harness::new();
    let mut nav = h.open(QUIZLESS_FIRST_CHAPTER).await;
    let mut rx = nav.subscribe();

    nav.go_to(Cursor::new(1, 0)).unwrap();
    assert!(matches!(nav.next().await.unwrap(), NextOutcome::QuizOpened { .. }));
    assert_eq!(
        answer(&mut nav, 0).await,
        QuizAdvance::Passed {
            cursor: Cursor::new(1, 0),
            course_completed: true,
        }
    );
    assert_eq!(nav.cursor(), Cursor::new(1, 0));
    assert_eq!(h.remote.calls().complete_course, 1);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.first(), Some(&LearningEvent::CursorMoved(Cursor::new(1, 0))));
    assert_eq!(events.last(), Some(&LearningEvent::CourseCompleted));
}

#[tokio::test]
async fn end_of_course_without_eligibility_does_not_move() {
    let h = Harness::new();
    let mut nav = h.open(THREE_CHAPTERS).await;
    nav.go_to(Cursor::new(2, 0)).unwrap();

    assert_eq!(nav.next().await.unwrap(), NextOutcome::EndOfCourse);
    assert_eq!(nav.next().await.unwrap(), NextOutcome::EndOfCourse);
    assert_eq!(nav.cursor(), Cursor::new(2, 0));
    assert_eq!(h.remote.calls().update_progress, 2);
    assert_eq!(h.remote.calls().complete_course, 0);
}

#[tokio::test]
async fn running_quiz_blocks_navigation() {
    let h = Harness::new();
    let mut nav = h.open(QUIZLESS_FIRST_CHAPTER).await;
    nav.go_to(Cursor::new(1, 0)).unwrap();
    assert!(matches!(nav.next().await.unwrap(), NextOutcome::QuizOpened { .. }));
    assert_eq!(nav.cursor(), Cursor::new(1, 0));
    assert!(matches!(nav.next().await, Err(NavigationError::QuizInProgress)));
    assert!(matches!(nav.prev(), Err(NavigationError::QuizInProgress)));
    assert!(matches!(
        nav.go_to(Cursor::start()),
        Err(NavigationError::QuizInProgress)
    ));
}

#[tokio::test]
async fn repeated_validate_is_reported_once() {
    let h = Harness::new();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    nav.go_to(Cursor::new(0, 1)).unwrap();
    nav.next().await.unwrap();

    nav.select_option(1).await.unwrap();
    let first = nav.validate_answer().await.unwrap();
    let state = nav.quiz().unwrap().state().clone();
    let second = nav.validate_answer().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(nav.quiz().unwrap().state(), &state);
    assert!(matches!(state, QuestionState::Revealed(_)));

    assert!(nav.flush_reports().await);
    assert_eq!(h.remote.calls().submit_answer, 1);
}

#[tokio::test]
async fn offline_session_keeps_navigating_from_cache() {
    let h = Harness::new();
    h.remote.set_mode(RemoteMode::Offline);
    let mut rx = h.events.subscribe();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    assert_eq!(
        rx.try_recv().unwrap(),
        LearningEvent::Degraded {
            operation: "fetch_progress"
        }
    );

    assert_eq!(nav.next().await.unwrap(), NextOutcome::Advanced(Cursor::new(0, 1)));
    nav.next().await.unwrap();
    answer(&mut nav, 0).await;
    assert_eq!(
        answer(&mut nav, 0).await,
        QuizAdvance::Passed {
            cursor: Cursor::new(0, 1),
            course_completed: false
        }
    );
    assert!(nav.record().is_quiz_passed(TopicKey::new(0, 1)));
    assert!(!nav.record().is_completed());

    assert_eq!(nav.next().await.unwrap(), NextOutcome::EndOfCourse);
    assert_eq!(nav.cursor(), Cursor::new(0, 1));
    assert_eq!(h.remote.calls().complete_course, 1);
}

#[tokio::test]
async fn expired_credentials_leave_cursor_and_progress_alone() {
    let h = Harness::new();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    let before = nav.record().clone();
    let mut rx = nav.subscribe();

    h.remote.set_mode(RemoteMode::AuthExpired);
    let err = nav.next().await.unwrap_err();
    assert!(err.is_auth_expired());
    assert_eq!(nav.cursor(), Cursor::start());
    assert_eq!(nav.record(), &before);
    assert_eq!(rx.try_recv().unwrap(), LearningEvent::AuthExpired);
}

#[tokio::test]
async fn expired_credentials_keep_the_quiz_open() {
    let h = Harness::new();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    nav.go_to(Cursor::new(0, 1)).unwrap();
    nav.next().await.unwrap();
    answer(&mut nav, 0).await;
    nav.select_option(1).await.unwrap();
    nav.validate_answer().await.unwrap();
    let before = nav.record().clone();

    h.remote.set_mode(RemoteMode::AuthExpired);
    let err = nav.advance_quiz().await.unwrap_err();
    assert!(err.is_auth_expired());
    assert!(nav.quiz().is_some());
    assert_eq!(nav.record(), &before);
}

#[tokio::test]
async fn saved_quiz_resumes_after_reload() {
    let h = Harness::new();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    nav.go_to(Cursor::new(0, 1)).unwrap();
    nav.next().await.unwrap();
    nav.select_option(1).await.unwrap();
    drop(nav);

    let reopened = h.open(TWO_TOPIC_COURSE).await;
    let quiz = reopened.quiz().unwrap();
    assert_eq!(quiz.question_index(), 0);
    assert_eq!(quiz.state(), &QuestionState::Selected(1));
    assert_eq!(
        reopened.state(),
        NavState::AwaitingQuiz {
            return_to: Cursor::new(0, 1)
        }
    );
}

#[tokio::test]
async fn revisiting_a_passed_chapter_skips_the_quiz() {
    let h = Harness::new();
    let mut nav = h.open(THREE_CHAPTERS).await;
    assert!(matches!(nav.next().await.unwrap(), NextOutcome::QuizOpened { .. }));
    assert_eq!(
        answer(&mut nav, 1).await,
        QuizAdvance::Passed {
            cursor: Cursor::new(1, 0),
            course_completed: false,
        }
    );

    assert_eq!(nav.prev().unwrap(), Cursor::new(0, 0));
    assert_eq!(nav.next().await.unwrap(), NextOutcome::Advanced(Cursor::new(1, 0)));
    assert!(nav.quiz().is_none());
    assert!(nav.topic_status(0, 0).completed);
    assert!((nav.topic_status(0, 0).accuracy - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn malformed_course_redirects_to_dashboard() {
    let h = Harness::new();
    let result = NavigationController::open_json(r#"{"_id": "x", "title": "Empty", "chapters": []}"#, h.context()).await;
    let Err(err) = result else {
        panic!("empty course must be rejected");
    };
    assert_eq!(err.redirect(), Some(Redirect::Dashboard));
}

#[tokio::test]
async fn out_of_range_jump_is_rejected() {
    let h = Harness::new();
    let mut nav = h.open(TWO_TOPIC_COURSE).await;
    assert!(matches!(nav.go_to(Cursor::new(0, 2)), Err(NavigationError::Curriculum(_))));
    assert_eq!(nav.cursor(), Cursor::start());
}

#[tokio::test]
async fn expired_credentials_at_open_are_fatal() {
    let h = Harness::new();
    h.remote.set_mode(RemoteMode::AuthExpired);
    let mut rx = h.events.subscribe();

    let Err(err) = NavigationController::open_json(TWO_TOPIC_COURSE, h.context()).await else {
        panic!("open must fail on rejected credentials");
    };
    assert!(err.is_auth_expired());
    assert!(matches!(err, NavigationError::Remote(RemoteError::AuthExpired)));
    assert_eq!(rx.try_recv().unwrap(), LearningEvent::AuthExpired);

    let stored = h
        .storage
        .progress
        .load_progress(&CourseId::new("rust-101").unwrap())
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn rejected_progress_update_after_chapter_completion_changes_nothing() {
    let h = Harness::new();
    let remote = PartialExpiry::new(h.remote.clone());
    let mut nav = reveal_ownership_quiz(&h, &remote).await;
    let before = nav.record().clone();
    let mut rx = nav.subscribe();

    remote.reject_update.store(true, Ordering::SeqCst);
    let err = nav.advance_quiz().await.unwrap_err();
    assert!(err.is_auth_expired());
    assert_eq!(h.remote.calls().complete_chapter_quiz, 1);
    assert!(nav.quiz().is_some());
    assert_eq!(nav.record(), &before);
    assert!(!nav.record().is_quiz_passed(TopicKey::new(1, 0)));
    assert_eq!(nav.cursor(), Cursor::new(1, 0));
    assert_eq!(drain(&mut rx), vec![LearningEvent::AuthExpired]);

    let stored = h.storage.progress.load_progress(before.course_id()).await.unwrap();
    assert_eq!(stored.as_ref(), Some(&before));
    assert!(h.storage.quizzes.load_quiz(before.course_id()).await.unwrap().is_some());

    remote.reject_update.store(false, Ordering::SeqCst);
    assert_eq!(
        nav.advance_quiz().await.unwrap(),
        QuizAdvance::Passed {
            cursor: Cursor::new(1, 0),
            course_completed: true,
        }
    );
    assert!(nav.quiz().is_none());
    assert!(nav.record().is_completed());
}

#[tokio::test]
async fn rejected_course_completion_keeps_the_quiz_and_retries() {
    let h = Harness::new();
    let remote = PartialExpiry::new(h.remote.clone());
    let mut nav = reveal_ownership_quiz(&h, &remote).await;
    let before = nav.record().clone();

    remote.reject_completion.store(true, Ordering::SeqCst);
    let err = nav.advance_quiz().await.unwrap_err();
    assert!(matches!(err, NavigationError::Remote(RemoteError::AuthExpired)));
    assert_eq!(h.remote.calls().update_progress, 1);
    assert!(nav.quiz().is_some());
    assert_eq!(nav.record(), &before);
    assert!(h.storage.quizzes.load_quiz(before.course_id()).await.unwrap().is_some());

    remote.reject_completion.store(false, Ordering::SeqCst);
    assert_eq!(
        nav.advance_quiz().await.unwrap(),
        QuizAdvance::Passed {
            cursor: Cursor::new(1, 0),
            course_completed: true,
        }
    );
    assert!(nav.record().is_quiz_passed(TopicKey::new(1, 0)));
    assert!(nav.record().is_completed());
    assert_eq!(h.remote.calls().complete_course, 1);
    assert_eq!(h.remote.calls().complete_chapter_quiz, 2);
    assert!(h.storage.quizzes.load_quiz(before.course_id()).await.unwrap().is_none());
}

#[tokio::test]
async fn reports_of_an_aborted_quiz_do_not_affect_the_next_one() {
    let h = Harness::new();
    let mut nav = h.open(QUIZLESS_FIRST_CHAPTER).await;
    nav.go_to(Cursor::new(1, 0)).unwrap();
    nav.next().await.unwrap();

    h.remote.set_mode(RemoteMode::Offline);
    nav.select_option(0).await.unwrap();
    nav.validate_answer().await.unwrap();
    tokio::task::yield_now().await;
    nav.abort_quiz(true).await.unwrap();
    h.remote.set_mode(RemoteMode::Online);

    let mut rx = nav.subscribe();
    nav.next().await.unwrap();
    answer(&mut nav, 1).await;
    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, LearningEvent::Degraded { .. })));
    assert!(nav.record().is_completed());
}
