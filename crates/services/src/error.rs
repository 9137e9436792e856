//! Shared error types for the services crate.

use thiserror::Error;

use learn_core::model::{CurriculumError, ProgressError, QuizError};
use storage::repository::StorageError;

/// Failures talking to the remote progress service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteError {
    /// Transport failure or timeout; callers fall back to the cache.
    #[error("progress service unavailable: {0}")]
    Unavailable(String),
    /// 401 from the service; the session must re-authenticate.
    #[error("credentials rejected by progress service")]
    AuthExpired,
    #[error("progress service returned status {0}")]
    Status(u16),
    #[error("unreadable progress service response: {0}")]
    Decode(String),
}

impl RemoteError {
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

/// Errors emitted by `ProgressCache`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressCacheError {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuizEngine`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizEngineError {
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error("aborting the quiz requires confirmation")]
    AbortNotConfirmed,
    #[error(transparent)]
    Remote(RemoteError),
}

/// Errors emitted by `CompletionEvaluator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompletionError {
    #[error(transparent)]
    Remote(RemoteError),
    #[error(transparent)]
    Cache(#[from] ProgressCacheError),
}

/// Where the presentation layer should go instead of the course view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    Dashboard,
    Certification,
}

/// Errors emitted by `NavigationController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("malformed curriculum: {0}")]
    MalformedCurriculum(CurriculumError),
    #[error(transparent)]
    Curriculum(CurriculumError),
    #[error("a chapter quiz is in progress")]
    QuizInProgress,
    #[error("no chapter quiz is in progress")]
    NoActiveQuiz,
    #[error(transparent)]
    Quiz(#[from] QuizEngineError),
    #[error(transparent)]
    Cache(#[from] ProgressCacheError),
    #[error(transparent)]
    Remote(RemoteError),
}

impl NavigationError {
    /// Safe-default destination when the controller cannot serve the course.
    #[must_use]
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            Self::MalformedCurriculum(_) => Some(Redirect::Dashboard),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::Remote(err) | Self::Quiz(QuizEngineError::Remote(err)) => err.is_auth_expired(),
            _ => false,
        }
    }
}

impl From<CurriculumError> for NavigationError {
    fn from(err: CurriculumError) -> Self {
        if err.is_malformed() {
            Self::MalformedCurriculum(err)
        } else {
            Self::Curriculum(err)
        }
    }
}

impl From<CompletionError> for NavigationError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Remote(err) => Self::Remote(err),
            CompletionError::Cache(err) => Self::Cache(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_curriculum_redirects_to_dashboard() {
        let err = NavigationError::from(CurriculumError::NoChapters);
        assert_eq!(err.redirect(), Some(Redirect::Dashboard));

        let lookup = NavigationError::from(CurriculumError::OutOfRange {
            chapter: 3,
            topic: None,
        });
        assert!(matches!(lookup, NavigationError::Curriculum(_)));
        assert_eq!(lookup.redirect(), None);
    }

    #[test]
    fn auth_expiry_is_detected_through_quiz_errors() {
        let err = NavigationError::Quiz(QuizEngineError::Remote(RemoteError::AuthExpired));
        assert!(err.is_auth_expired());
        assert!(!NavigationError::QuizInProgress.is_auth_expired());
    }
}
