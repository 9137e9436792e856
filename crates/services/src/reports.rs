use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::events::{EventBus, LearningEvent};
use crate::remote::{AnswerReport, ProgressRemote, RemoteError};

/// Sends answer reports in the background without blocking the quiz.
///
/// Failures are logged and announced on the event bus; they never reach the
/// caller of `submit_answer`. `flush` waits for everything still in flight.
pub struct ReportDispatcher {
    remote: Arc<dyn ProgressRemote>,
    events: EventBus,
    in_flight: Vec<JoinHandle<bool>>,
    dropped: usize,
}

impl ReportDispatcher {
    #[must_use]
    pub fn new(remote: Arc<dyn ProgressRemote>, events: EventBus) -> Self {
        Self {
            remote,
            events,
            in_flight: Vec::new(),
            dropped: 0,
        }
    }

    /// Fire-and-forget delivery of one answer.
    pub fn submit_answer(&mut self, report: AnswerReport) {
        let Ok(handle) = Handle::try_current() else {
            warn!(course = %report.course_id, "no async runtime; answer report dropped");
            self.dropped += 1;
            return;
        };
        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        self.in_flight.push(handle.spawn(async move {
            match remote.submit_answer(&report).await {
                Ok(()) => true,
                Err(err) => {
                    report_failure(&events, &report, &err);
                    false
                }
            }
        }));
    }

    /// Reports spawned and not yet awaited by `flush`.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.in_flight.iter().filter(|task| !task.is_finished()).count()
    }

    /// Stop tracking outstanding reports without cancelling them. Their
    /// failures are still announced, but the next `flush` no longer sees
    /// them. Returns how many were left running.
    pub fn detach(&mut self) -> usize {
        self.dropped = 0;
        self.in_flight.drain(..).filter(|task| !task.is_finished()).count()
    }

    /// Wait for every outstanding report. Returns `true` when all of them,
    /// including any dropped since the last flush, were delivered.
    pub async fn flush(&mut self) -> bool {
        let mut all_ok = self.dropped == 0;
        self.dropped = 0;
        for task in self.in_flight.drain(..) {
            match task.await {
                Ok(delivered) => all_ok &= delivered,
                Err(err) => {
                    warn!(error = %err, "answer report task failed");
                    all_ok = false;
                }
            }
        }
        all_ok
    }
}

fn report_failure(events: &EventBus, report: &AnswerReport, err: &RemoteError) {
    warn!(
        course = %report.course_id,
        chapter = report.chapter_index,
        question = report.question_index,
        error = %err,
        "answer report failed"
    );
    if err.is_auth_expired() {
        events.emit(LearningEvent::AuthExpired);
    } else {
        events.emit(LearningEvent::Degraded {
            operation: "submit_answer",
        });
    }
}
