use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use learn_core::model::{CourseId, Cursor, ProgressRecord};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::{AnswerReport, CredentialProvider, ProgressRemote, RemoteError};

const DEFAULT_BASE_URL: &str = "http://localhost:5500";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RemoteConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = env::var("LEARN_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let timeout = env::var("LEARN_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);
        Self { base_url, timeout }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CursorBody<'a> {
    course_id: &'a CourseId,
    chapter_index: usize,
    topic_index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CourseBody<'a> {
    course_id: &'a CourseId,
}

/// reqwest-backed client for the progress service.
#[derive(Clone)]
pub struct HttpProgressRemote {
    client: Client,
    config: RemoteConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpProgressRemote {
    /// # Errors
    ///
    /// Returns `RemoteError::Unavailable` if the HTTP client cannot be built.
    pub fn new(
        config: RemoteConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let request = match self.credentials.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request
            .send()
            .await
            .map_err(|e| RemoteError::Unavailable(e.to_string()))
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<Response, RemoteError> {
        let url = self.config.url(path);
        debug!(%url, "POST progress service");
        let response = self.send(self.client.post(url).json(body)).await?;
        check_status(response)
    }

    async fn decode(response: Response) -> Result<ProgressRecord, RemoteError> {
        response
            .json::<ProgressRecord>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

fn check_status(response: Response) -> Result<Response, RemoteError> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(RemoteError::AuthExpired),
        status if status.is_success() => Ok(response),
        status => Err(RemoteError::Status(status.as_u16())),
    }
}

#[async_trait]
impl ProgressRemote for HttpProgressRemote {
    async fn fetch_progress(&self, course_id: &CourseId) -> Result<Option<ProgressRecord>, RemoteError> {
        let url = self.config.url(&format!("progress/{course_id}"));
        debug!(%url, "GET progress service");
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response)?;
        Self::decode(response).await.map(Some)
    }

    async fn update_progress(
        &self,
        course_id: &CourseId,
        cursor: Cursor,
    ) -> Result<ProgressRecord, RemoteError> {
        let body = CursorBody {
            course_id,
            chapter_index: cursor.chapter_index,
            topic_index: cursor.topic_index,
        };
        let response = self.post("progress/update", &body).await?;
        Self::decode(response).await
    }

    async fn submit_answer(&self, report: &AnswerReport) -> Result<(), RemoteError> {
        self.post("course/submitAnswer", report).await?;
        Ok(())
    }

    async fn complete_chapter_quiz(&self, course_id: &CourseId, cursor: Cursor) -> Result<(), RemoteError> {
        let body = CursorBody {
            course_id,
            chapter_index: cursor.chapter_index,
            topic_index: cursor.topic_index,
        };
        self.post("topic-progress/quiz/complete", &body).await?;
        Ok(())
    }

    async fn complete_course(&self, course_id: &CourseId) -> Result<ProgressRecord, RemoteError> {
        let response = self.post("course/complete", &CourseBody { course_id }).await?;
        Self::decode(response).await
    }
}
