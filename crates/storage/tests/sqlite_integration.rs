use std::collections::BTreeMap;

use chrono::Duration;
use learn_core::model::{
    CourseId, Cursor, ProgressRecord, QuizSnapshot, ReturnCursor, TopicKey, TopicTally,
};
use learn_core::time::fixed_now;
use storage::repository::{ProgressRepository, QuizSessionRepository};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn course() -> CourseId {
    CourseId::new("course-42").unwrap()
}

fn snapshot(cursor: Cursor, question_index: usize) -> QuizSnapshot {
    let mut tallies = BTreeMap::new();
    tallies.insert(0, TopicTally { attempted: 2, correct: 1 });
    QuizSnapshot {
        course_id: course(),
        return_to: ReturnCursor {
            cursor,
            chapter_title: "Ownership".into(),
        },
        question_index,
        selected: Some(1),
        revealed: true,
        tallies,
    }
}

#[tokio::test]
async fn sqlite_progress_round_trip_is_deep_equal() {
    let repo = repo("memdb_progress_roundtrip").await;
    assert!(repo.load_progress(&course()).await.unwrap().is_none());

    let record = ProgressRecord::empty(course())
        .with_cursor(Cursor::new(2, 1))
        .with_quiz_result(TopicKey::new(0, 0), 3, 2)
        .with_quiz_result(TopicKey::new(1, 4), 1, 1)
        .with_completed(true);
    repo.save_progress(&record, fixed_now()).await.unwrap();

    let loaded = repo.load_progress(&course()).await.unwrap();
    assert_eq!(loaded, Some(record));
}

#[tokio::test]
async fn sqlite_save_replaces_previous_snapshot() {
    let repo = repo("memdb_progress_replace").await;
    let first = ProgressRecord::empty(course()).with_quiz_result(TopicKey::new(0, 0), 1, 1);
    repo.save_progress(&first, fixed_now()).await.unwrap();

    let second = ProgressRecord::empty(course()).with_cursor(Cursor::new(0, 1));
    repo.save_progress(&second, fixed_now() + Duration::minutes(1))
        .await
        .unwrap();

    let loaded = repo.load_progress(&course()).await.unwrap().unwrap();
    assert_eq!(loaded, second);
    assert!(loaded.topic_progress().is_empty());
}

#[tokio::test]
async fn sqlite_quiz_snapshot_lifecycle() {
    let repo = repo("memdb_quiz_lifecycle").await;
    assert!(repo.load_quiz(&course()).await.unwrap().is_none());

    let snap = snapshot(Cursor::new(0, 2), 1);
    repo.save_quiz(&snap, fixed_now()).await.unwrap();
    let stored = repo.load_quiz(&course()).await.unwrap().unwrap();
    assert_eq!(stored.snapshot, snap);
    assert_eq!(stored.saved_at, fixed_now());

    // A quiz for another chapter replaces the first one.
    let other = snapshot(Cursor::new(1, 0), 0);
    repo.save_quiz(&other, fixed_now() + Duration::minutes(5))
        .await
        .unwrap();
    let stored = repo.load_quiz(&course()).await.unwrap().unwrap();
    assert_eq!(stored.snapshot.return_to.cursor, Cursor::new(1, 0));

    repo.clear_quiz(&course(), Cursor::new(1, 0)).await.unwrap();
    assert!(repo.load_quiz(&course()).await.unwrap().is_none());
}
