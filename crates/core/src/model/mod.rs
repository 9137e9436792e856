mod course;
mod ids;
mod progress;
mod quiz;

pub use course::{
    Chapter, ChapterDraft, Course, CourseDraft, CurriculumError, OptionIndexRepr, Question,
    QuestionDraft, QuizDraft, Section, Topic, TopicContent, TopicDraft,
};
pub use ids::{CourseId, IdError};
pub use progress::{Cursor, ProgressError, ProgressRecord, TopicKey, TopicProgress, TopicStatus};
pub use quiz::{
    AnswerFeedback, QuestionState, QuizError, QuizSession, QuizSnapshot, QuizStep, ReturnCursor,
    TopicTally, Validation,
};
