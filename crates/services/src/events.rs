//! Change notifications for presentation layers.

use tokio::sync::broadcast;

use learn_core::model::{AnswerFeedback, Cursor};

/// Something observable changed in the learning session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearningEvent {
    CursorMoved(Cursor),
    QuizOpened { chapter_index: usize, questions: usize },
    AnswerRevealed(AnswerFeedback),
    QuizFinished { chapter_index: usize },
    QuizAborted { chapter_index: usize },
    ProgressReconciled,
    CourseCompleted,
    /// A remote call failed and the session continued from the cache.
    Degraded { operation: &'static str },
    /// The service rejected the credentials; the user must sign in again.
    AuthExpired,
}

/// Fan-out of `LearningEvent`s. Sending never blocks and never fails; slow
/// subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LearningEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 64;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LearningEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: LearningEvent) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
