use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::curriculum::ChapterQuestion;
use crate::model::ids::CourseId;
use crate::model::progress::{Cursor, ProgressRecord, TopicKey};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("chapter quiz has no questions")]
    EmptyQuiz,

    #[error("option {index} is out of range ({options} options)")]
    OptionOutOfRange { index: usize, options: usize },

    #[error("no option selected")]
    NoSelection,

    #[error("answer already revealed")]
    AlreadyRevealed,

    #[error("answer not revealed yet")]
    NotRevealed,

    #[error("quiz already finished")]
    Finished,

    #[error("saved quiz does not match the curriculum")]
    SnapshotMismatch,
}

impl QuizError {
    /// Integrity errors are local rejections of malformed input.
    #[must_use]
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Self::OptionOutOfRange { .. })
    }
}

//
// ─── TYPES ─────────────────────────────────────────────────────────────────────
//

/// Where navigation resumes once the quiz ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnCursor {
    #[serde(flatten)]
    pub cursor: Cursor,
    pub chapter_title: String,
}

/// Result of revealing one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub question_index: usize,
    pub topic_index: usize,
    pub selected: usize,
    pub correct_option: usize,
    pub is_correct: bool,
    pub explanation: Option<String>,
}

/// Per-question sub-state: `Unanswered → Selected → Revealed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionState {
    Unanswered,
    Selected(usize),
    Revealed(AnswerFeedback),
}

/// Outcome of `validate`. `newly_revealed` is false for a repeated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub feedback: AnswerFeedback,
    pub newly_revealed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizStep {
    Next { question_index: usize },
    Finished,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicTally {
    pub attempted: u32,
    pub correct: u32,
}

/// Persistable image of a running quiz. Questions are not stored; they are
/// re-derived from the curriculum on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    pub course_id: CourseId,
    pub return_to: ReturnCursor,
    pub question_index: usize,
    pub selected: Option<usize>,
    pub revealed: bool,
    #[serde(default)]
    pub tallies: BTreeMap<usize, TopicTally>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One chapter-validation quiz in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    course_id: CourseId,
    return_to: ReturnCursor,
    topic_count: usize,
    questions: Vec<ChapterQuestion>,
    current: usize,
    state: QuestionState,
    tallies: BTreeMap<usize, TopicTally>,
    finished: bool,
}

impl QuizSession {
    /// Open a quiz over the aggregated questions of a chapter.
    ///
    /// `topic_count` is the number of topics in the chapter; all of them are
    /// credited when the quiz finishes.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyQuiz` when there is nothing to ask.
    pub fn new(
        course_id: CourseId,
        return_to: ReturnCursor,
        topic_count: usize,
        questions: Vec<ChapterQuestion>,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::EmptyQuiz);
        }
        Ok(Self {
            course_id,
            return_to,
            topic_count,
            questions,
            current: 0,
            state: QuestionState::Unanswered,
            tallies: BTreeMap::new(),
            finished: false,
        })
    }

    /// Rebuild a session from a snapshot and freshly aggregated questions.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::SnapshotMismatch` if the snapshot points past the
    /// questions or at an option that no longer exists.
    pub fn restore(
        snapshot: QuizSnapshot,
        topic_count: usize,
        questions: Vec<ChapterQuestion>,
    ) -> Result<Self, QuizError> {
        let mut session = Self::new(
            snapshot.course_id,
            snapshot.return_to,
            topic_count,
            questions,
        )
        .map_err(|_| QuizError::SnapshotMismatch)?;

        let question = session
            .questions
            .get(snapshot.question_index)
            .ok_or(QuizError::SnapshotMismatch)?;
        if snapshot
            .tallies
            .keys()
            .any(|topic| *topic >= topic_count)
        {
            return Err(QuizError::SnapshotMismatch);
        }
        session.state = match (snapshot.selected, snapshot.revealed) {
            (None, false) => QuestionState::Unanswered,
            (None, true) => return Err(QuizError::SnapshotMismatch),
            (Some(selected), revealed) => {
                if selected >= question.question.options().len() {
                    return Err(QuizError::SnapshotMismatch);
                }
                if revealed {
                    QuestionState::Revealed(feedback_for(snapshot.question_index, question, selected))
                } else {
                    QuestionState::Selected(selected)
                }
            }
        };
        session.current = snapshot.question_index;
        session.tallies = snapshot.tallies;
        Ok(session)
    }

    #[must_use]
    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    #[must_use]
    pub fn return_to(&self) -> &ReturnCursor {
        &self.return_to
    }

    #[must_use]
    pub fn chapter_index(&self) -> usize {
        self.return_to.cursor.chapter_index
    }

    /// Number of topics credited when the quiz finishes.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topic_count
    }

    #[must_use]
    pub fn question_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.questions.len()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[must_use]
    pub fn state(&self) -> &QuestionState {
        &self.state
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&ChapterQuestion> {
        if self.finished {
            return None;
        }
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn tallies(&self) -> &BTreeMap<usize, TopicTally> {
        &self.tallies
    }

    fn question(&self) -> Result<&ChapterQuestion, QuizError> {
        self.current_question().ok_or(QuizError::Finished)
    }

    /// Choose an option for the current question.
    ///
    /// # Errors
    ///
    /// `OptionOutOfRange` for an index outside the options, `AlreadyRevealed`
    /// once the answer is shown, `Finished` after the last question.
    pub fn select(&mut self, option: usize) -> Result<&QuestionState, QuizError> {
        let options = self.question()?.question.options().len();
        if matches!(self.state, QuestionState::Revealed(_)) {
            return Err(QuizError::AlreadyRevealed);
        }
        if option >= options {
            return Err(QuizError::OptionOutOfRange {
                index: option,
                options,
            });
        }
        self.state = QuestionState::Selected(option);
        Ok(&self.state)
    }

    /// Reveal the answer and count the attempt. Repeating the call while
    /// revealed returns the same feedback and counts nothing.
    ///
    /// # Errors
    ///
    /// `NoSelection` before an option is chosen, `Finished` after the last
    /// question.
    pub fn validate(&mut self) -> Result<Validation, QuizError> {
        let question = self.question()?;
        let selected = match &self.state {
            QuestionState::Unanswered => return Err(QuizError::NoSelection),
            QuestionState::Revealed(feedback) => {
                return Ok(Validation {
                    feedback: feedback.clone(),
                    newly_revealed: false,
                });
            }
            QuestionState::Selected(selected) => *selected,
        };

        let feedback = feedback_for(self.current, question, selected);
        let tally = self.tallies.entry(feedback.topic_index).or_default();
        tally.attempted = tally.attempted.saturating_add(1);
        if feedback.is_correct {
            tally.correct = tally.correct.saturating_add(1);
        }
        self.state = QuestionState::Revealed(feedback.clone());
        Ok(Validation {
            feedback,
            newly_revealed: true,
        })
    }

    /// Move past a revealed question.
    ///
    /// # Errors
    ///
    /// `NotRevealed` unless the current answer is shown, `Finished` after the
    /// last question.
    pub fn advance(&mut self) -> Result<QuizStep, QuizError> {
        self.question()?;
        if !matches!(self.state, QuestionState::Revealed(_)) {
            return Err(QuizError::NotRevealed);
        }
        if self.is_last() {
            self.finished = true;
            return Ok(QuizStep::Finished);
        }
        self.current += 1;
        self.state = QuestionState::Unanswered;
        Ok(QuizStep::Next {
            question_index: self.current,
        })
    }

    /// Credit every topic of the chapter with this quiz's tallies.
    #[must_use]
    pub fn apply_to(&self, record: ProgressRecord) -> ProgressRecord {
        let chapter = self.chapter_index();
        (0..self.topic_count).fold(record, |record, topic| {
            let tally = self.tallies.get(&topic).copied().unwrap_or_default();
            record.with_quiz_result(TopicKey::new(chapter, topic), tally.attempted, tally.correct)
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> QuizSnapshot {
        let (selected, revealed) = match &self.state {
            QuestionState::Unanswered => (None, false),
            QuestionState::Selected(i) => (Some(*i), false),
            QuestionState::Revealed(f) => (Some(f.selected), true),
        };
        QuizSnapshot {
            course_id: self.course_id.clone(),
            return_to: self.return_to.clone(),
            question_index: self.current,
            selected,
            revealed,
            tallies: self.tallies.clone(),
        }
    }
}

fn feedback_for(question_index: usize, question: &ChapterQuestion, selected: usize) -> AnswerFeedback {
    let correct_option = question.question.correct_option();
    AnswerFeedback {
        question_index,
        topic_index: question.topic_index,
        selected,
        correct_option,
        is_correct: selected == correct_option,
        explanation: question.question.explanation().map(str::to_owned),
    }
}
