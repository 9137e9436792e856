//! Contract of the remote progress service.

mod http;
mod memory;

use async_trait::async_trait;
use learn_core::model::{CourseId, Cursor, ProgressRecord};
use serde::{Deserialize, Serialize};

pub use crate::error::RemoteError;
pub use http::{HttpProgressRemote, RemoteConfig};
pub use memory::{InMemoryProgressRemote, RemoteCalls, RemoteMode};

/// One answered quiz question, as reported to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReport {
    pub course_id: CourseId,
    pub chapter_index: usize,
    pub topic_index: usize,
    pub question_index: usize,
    pub selected_option_index: usize,
    pub correct_option_index: usize,
}

/// Authoritative owner of progress records.
///
/// Answer and completion endpoints must be idempotent upserts: reports are
/// delivered at least once.
#[async_trait]
pub trait ProgressRemote: Send + Sync {
    /// `Ok(None)` when the service has no record for the course yet.
    async fn fetch_progress(&self, course_id: &CourseId) -> Result<Option<ProgressRecord>, RemoteError>;

    async fn update_progress(
        &self,
        course_id: &CourseId,
        cursor: Cursor,
    ) -> Result<ProgressRecord, RemoteError>;

    async fn submit_answer(&self, report: &AnswerReport) -> Result<(), RemoteError>;

    async fn complete_chapter_quiz(&self, course_id: &CourseId, cursor: Cursor) -> Result<(), RemoteError>;

    async fn complete_course(&self, course_id: &CourseId) -> Result<ProgressRecord, RemoteError>;
}

/// Source of the bearer credential attached to every request.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, typically read from the environment.
#[derive(Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::new(std::env::var("LEARN_API_TOKEN").ok())
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticCredential")
            .field(&self.0.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
