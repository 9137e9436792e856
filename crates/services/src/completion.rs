use tracing::{info, warn};

use learn_core::{completion::is_eligible, curriculum::CurriculumStore, model::ProgressRecord};

use crate::error::CompletionError;
use crate::progress_cache::ProgressCache;
use crate::remote::{ProgressRemote, RemoteError};

/// Result of one completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCheck {
    /// Some quiz-bearing topic is not passed yet.
    NotEligible,
    /// The cached record already says completed; nothing was sent.
    AlreadyCompleted,
    /// The service confirmed completion during this call.
    Completed,
    /// A completion request was sent earlier in this session without a
    /// readable confirmation. It is not repeated.
    Deferred,
}

/// A completion check together with the record the service answered with,
/// if it answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub check: CompletionCheck,
    pub record: Option<ProgressRecord>,
}

impl Evaluation {
    fn local(check: CompletionCheck) -> Self {
        Self { check, record: None }
    }
}

/// Decides when a course is complete and requests the certificate at most
/// once per session.
#[derive(Debug, Default)]
pub struct CompletionEvaluator {
    requested: bool,
}

impl CompletionEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request went out and was never confirmed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.requested
    }

    /// Check eligibility against the cached record and, the first time it
    /// holds, ask the service to complete the course. The confirmed record
    /// is reconciled into the cache.
    ///
    /// # Errors
    ///
    /// `Remote` when the service rejected the request, `Cache` when the
    /// confirmed record cannot be stored.
    pub async fn evaluate(
        &mut self,
        curriculum: &CurriculumStore,
        cache: &mut ProgressCache,
        remote: &dyn ProgressRemote,
    ) -> Result<CompletionCheck, CompletionError> {
        let evaluation = self
            .request(curriculum, cache.record(), remote)
            .await
            .map_err(CompletionError::Remote)?;
        if let Some(record) = evaluation.record {
            cache.reconcile(record).await?;
        }
        Ok(evaluation.check)
    }

    /// Same check as `evaluate` against a record that is not cached yet.
    /// Nothing local is written.
    ///
    /// Transport and decode failures leave the request latched because the
    /// service may have processed it. Rejections clear the latch so a later
    /// check can retry.
    ///
    /// # Errors
    ///
    /// The service's error when it rejected the request.
    pub async fn request(
        &mut self,
        curriculum: &CurriculumStore,
        record: &ProgressRecord,
        remote: &dyn ProgressRemote,
    ) -> Result<Evaluation, RemoteError> {
        if record.is_completed() {
            return Ok(Evaluation::local(CompletionCheck::AlreadyCompleted));
        }
        if !is_eligible(record, curriculum) {
            return Ok(Evaluation::local(CompletionCheck::NotEligible));
        }
        if self.requested {
            return Ok(Evaluation::local(CompletionCheck::Deferred));
        }

        self.requested = true;
        let course_id = curriculum.course_id();
        match remote.complete_course(course_id).await {
            Ok(record) => {
                let check = if record.is_completed() {
                    info!(course = %course_id, "course completed");
                    CompletionCheck::Completed
                } else {
                    warn!(course = %course_id, "completion not reflected in returned record");
                    CompletionCheck::Deferred
                };
                Ok(Evaluation {
                    check,
                    record: Some(record),
                })
            }
            Err(err @ (RemoteError::Unavailable(_) | RemoteError::Decode(_))) => {
                warn!(course = %course_id, error = %err, "course completion unconfirmed");
                Ok(Evaluation::local(CompletionCheck::Deferred))
            }
            Err(err) => {
                self.requested = false;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::remote::{InMemoryProgressRemote, RemoteMode};
    use learn_core::model::{Chapter, Course, CourseId, Question, Topic, TopicContent, TopicKey};
    use learn_core::time::fixed_clock;
    use storage::repository::InMemoryRepository;

    fn curriculum() -> CurriculumStore {
        let quiz = vec![Question::new("q", vec!["a".into(), "b".into()], 0, None).unwrap()];
        let chapter = Chapter::new("one", vec![Topic::new("a", TopicContent::default(), quiz)]);
        CurriculumStore::new(Course::new(CourseId::new("c").unwrap(), "C", None, vec![chapter]).unwrap())
    }

    async fn cache(passed: bool) -> ProgressCache {
        let id = CourseId::new("c").unwrap();
        let mut cache = ProgressCache::load(&id, Arc::new(InMemoryRepository::new()), fixed_clock())
            .await
            .unwrap();
        if passed {
            let record = cache.record().clone().with_quiz_result(TopicKey::new(0, 0), 1, 1);
            cache.reconcile(record).await.unwrap();
        }
        cache
    }

    #[tokio::test]
    async fn completes_once_and_then_reports_already_completed() {
        let curriculum = curriculum();
        let remote = InMemoryProgressRemote::new();
        let mut cache = cache(true).await;
        let mut evaluator = CompletionEvaluator::new();

        let first = evaluator.evaluate(&curriculum, &mut cache, &remote).await.unwrap();
        let second = evaluator.evaluate(&curriculum, &mut cache, &remote).await.unwrap();
        assert_eq!(first, CompletionCheck::Completed);
        assert_eq!(second, CompletionCheck::AlreadyCompleted);
        assert_eq!(remote.calls().complete_course, 1);
        assert!(cache.record().is_completed());
    }

    #[tokio::test]
    async fn not_eligible_sends_nothing() {
        let remote = InMemoryProgressRemote::new();
        let mut cache = cache(false).await;
        let check = CompletionEvaluator::new()
            .evaluate(&curriculum(), &mut cache, &remote)
            .await
            .unwrap();
        assert_eq!(check, CompletionCheck::NotEligible);
        assert_eq!(remote.calls().complete_course, 0);
    }

    #[tokio::test]
    async fn unconfirmed_request_is_not_repeated() {
        let curriculum = curriculum();
        let remote = InMemoryProgressRemote::with_mode(RemoteMode::Offline);
        let mut cache = cache(true).await;
        let mut evaluator = CompletionEvaluator::new();

        for _ in 0..3 {
            let check = evaluator.evaluate(&curriculum, &mut cache, &remote).await.unwrap();
            assert_eq!(check, CompletionCheck::Deferred);
        }
        assert_eq!(remote.calls().complete_course, 1);
        assert!(evaluator.is_pending());
        assert!(!cache.record().is_completed());
    }

    #[tokio::test]
    async fn rejected_request_can_be_retried() {
        let curriculum = curriculum();
        let remote = InMemoryProgressRemote::with_mode(RemoteMode::AuthExpired);
        let mut cache = cache(true).await;
        let mut evaluator = CompletionEvaluator::new();

        let err = evaluator
            .evaluate(&curriculum, &mut cache, &remote)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::Remote(RemoteError::AuthExpired)));
        assert!(!evaluator.is_pending());

        remote.set_mode(RemoteMode::Online);
        let check = evaluator.evaluate(&curriculum, &mut cache, &remote).await.unwrap();
        assert_eq!(check, CompletionCheck::Completed);
        assert_eq!(remote.calls().complete_course, 2);
    }

    #[tokio::test]
    async fn request_leaves_the_cache_alone() {
        let curriculum = curriculum();
        let remote = InMemoryProgressRemote::new();
        let cache = cache(false).await;
        let pending = cache.record().clone().with_quiz_result(TopicKey::new(0, 0), 1, 1);

        let evaluation = CompletionEvaluator::new()
            .request(&curriculum, &pending, &remote)
            .await
            .unwrap();
        assert_eq!(evaluation.check, CompletionCheck::Completed);
        assert!(evaluation.record.unwrap().is_completed());
        assert!(!cache.record().is_quiz_passed(TopicKey::new(0, 0)));
    }
}
