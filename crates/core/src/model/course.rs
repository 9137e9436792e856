use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, IdError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Rejections raised while loading a curriculum or addressing into it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CurriculumError {
    #[error("curriculum is not valid JSON: {0}")]
    InvalidJson(String),

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("course title cannot be empty")]
    EmptyTitle,

    #[error("course has no chapters")]
    NoChapters,

    #[error("chapter {chapter} has no topics")]
    EmptyChapter { chapter: usize },

    #[error("question {question} of topic {chapter}:{topic} has no options")]
    QuestionWithoutOptions {
        chapter: usize,
        topic: usize,
        question: usize,
    },

    #[error(
        "question {question} of topic {chapter}:{topic} marks option {index} correct but has {options} options"
    )]
    CorrectOptionOutOfRange {
        chapter: usize,
        topic: usize,
        question: usize,
        index: usize,
        options: usize,
    },

    #[error("question {question} of topic {chapter}:{topic} has an unreadable correct option `{raw}`")]
    InvalidCorrectOption {
        chapter: usize,
        topic: usize,
        question: usize,
        raw: String,
    },

    #[error("curriculum index out of range: chapter {chapter}, topic {topic:?}")]
    OutOfRange { chapter: usize, topic: Option<usize> },
}

impl CurriculumError {
    /// True for every variant that describes a broken curriculum document
    /// rather than a bad lookup.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::OutOfRange { .. })
    }
}

//
// ─── DRAFTS (WIRE SHAPE) ───────────────────────────────────────────────────────
//

/// Course document as delivered by the content service. Unvalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDraft {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topic_name: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterDraft {
    #[serde(rename = "chapterTitle", alias = "title", default)]
    pub title: String,
    #[serde(default)]
    pub topics: Vec<TopicDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: TopicContent,
    #[serde(default)]
    pub quiz: Option<QuizDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizDraft {
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    #[serde(rename = "question", alias = "prompt", default)]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_option_index: OptionIndexRepr,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Content generators emit the correct option either as a number or as a
/// numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionIndexRepr {
    Number(u64),
    Text(String),
}

impl OptionIndexRepr {
    fn resolve(&self) -> Option<usize> {
        match self {
            Self::Number(n) => usize::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn raw(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

/// Body of a topic: a short description followed by ordered sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicContent {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Text { value: String },
    Code { code: String },
}

//
// ─── VALIDATED ENTITIES ────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
    explanation: Option<String>,
}

impl Question {
    /// Build a question directly.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` if there are no options or the correct index
    /// does not address one of them. Positions in the error are reported as 0.
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
        explanation: Option<String>,
    ) -> Result<Self, CurriculumError> {
        Self::checked(prompt.into(), options, correct_option, explanation, (0, 0, 0))
    }

    fn checked(
        prompt: String,
        options: Vec<String>,
        correct_option: usize,
        explanation: Option<String>,
        (chapter, topic, question): (usize, usize, usize),
    ) -> Result<Self, CurriculumError> {
        if options.is_empty() {
            return Err(CurriculumError::QuestionWithoutOptions {
                chapter,
                topic,
                question,
            });
        }
        if correct_option >= options.len() {
            return Err(CurriculumError::CorrectOptionOutOfRange {
                chapter,
                topic,
                question,
                index: correct_option,
                options: options.len(),
            });
        }
        Ok(Self {
            prompt,
            options,
            correct_option,
            explanation: explanation.filter(|e| !e.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    title: String,
    content: TopicContent,
    questions: Vec<Question>,
}

impl Topic {
    #[must_use]
    pub fn new(title: impl Into<String>, content: TopicContent, questions: Vec<Question>) -> Self {
        Self {
            title: title.into(),
            content,
            questions,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &TopicContent {
        &self.content
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// A topic carries quiz content when at least one question is attached.
    #[must_use]
    pub fn has_quiz(&self) -> bool {
        !self.questions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    title: String,
    topics: Vec<Topic>,
}

impl Chapter {
    #[must_use]
    pub fn new(title: impl Into<String>, topics: Vec<Topic>) -> Self {
        Self {
            title: title.into(),
            topics,
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Index of the last topic. Validated chapters always have one.
    #[must_use]
    pub fn last_topic_index(&self) -> usize {
        self.topics.len().saturating_sub(1)
    }

    #[must_use]
    pub fn has_quiz(&self) -> bool {
        self.topics.iter().any(Topic::has_quiz)
    }
}

/// Immutable curriculum: course → chapters → topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    id: CourseId,
    title: String,
    topic_name: Option<String>,
    chapters: Vec<Chapter>,
}

impl Course {
    /// Assemble a course from already-built chapters.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError` if the title is blank, there are no chapters,
    /// or any chapter has no topics.
    pub fn new(
        id: CourseId,
        title: impl Into<String>,
        topic_name: Option<String>,
        chapters: Vec<Chapter>,
    ) -> Result<Self, CurriculumError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(CurriculumError::EmptyTitle);
        }
        if chapters.is_empty() {
            return Err(CurriculumError::NoChapters);
        }
        if let Some(chapter) = chapters.iter().position(|c| c.topics.is_empty()) {
            return Err(CurriculumError::EmptyChapter { chapter });
        }
        Ok(Self {
            id,
            title,
            topic_name: topic_name.filter(|n| !n.trim().is_empty()),
            chapters,
        })
    }

    /// Validate a course document at the boundary.
    ///
    /// # Errors
    ///
    /// Returns the first `CurriculumError` found, walking chapters, topics and
    /// questions in order.
    pub fn from_draft(draft: CourseDraft) -> Result<Self, CurriculumError> {
        let id = CourseId::new(draft.id)?;
        let mut chapters = Vec::with_capacity(draft.chapters.len());
        for (c_idx, chapter) in draft.chapters.into_iter().enumerate() {
            let mut topics = Vec::with_capacity(chapter.topics.len());
            for (t_idx, topic) in chapter.topics.into_iter().enumerate() {
                let drafts = topic.quiz.map(|q| q.questions).unwrap_or_default();
                let mut questions = Vec::with_capacity(drafts.len());
                for (q_idx, q) in drafts.into_iter().enumerate() {
                    let correct = q.correct_option_index.resolve().ok_or_else(|| {
                        CurriculumError::InvalidCorrectOption {
                            chapter: c_idx,
                            topic: t_idx,
                            question: q_idx,
                            raw: q.correct_option_index.raw(),
                        }
                    })?;
                    questions.push(Question::checked(
                        q.prompt,
                        q.options,
                        correct,
                        q.explanation,
                        (c_idx, t_idx, q_idx),
                    )?);
                }
                topics.push(Topic::new(topic.title, topic.content, questions));
            }
            chapters.push(Chapter::new(chapter.title, topics));
        }
        Self::new(id, draft.title, draft.topic_name, chapters)
    }

    /// Parse and validate a course JSON document.
    ///
    /// # Errors
    ///
    /// Returns `CurriculumError::InvalidJson` for undecodable input, or any
    /// validation error from [`Course::from_draft`].
    pub fn from_json(raw: &str) -> Result<Self, CurriculumError> {
        let draft: CourseDraft =
            serde_json::from_str(raw).map_err(|e| CurriculumError::InvalidJson(e.to_string()))?;
        Self::from_draft(draft)
    }

    #[must_use]
    pub fn id(&self) -> &CourseId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Subject name used for certification; falls back to the title.
    #[must_use]
    pub fn topic_name(&self) -> &str {
        self.topic_name.as_deref().unwrap_or(&self.title)
    }

    #[must_use]
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "_id": "c-1",
        "title": "Rust Basics",
        "topicName": "Rust",
        "chapters": [
            {
                "chapterTitle": "Ownership",
                "topics": [
                    {
                        "title": "Moves",
                        "content": {
                            "description": "What a move is",
                            "sections": [
                                { "type": "text", "value": "Values have one owner." },
                                { "type": "code", "code": "let b = a;" }
                            ]
                        },
                        "quiz": { "questions": [
                            { "question": "Who owns a value?", "options": ["one", "many"], "correctOptionIndex": "0" }
                        ] }
                    },
                    { "title": "Borrows" }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_wire_document() {
        let course = Course::from_json(SAMPLE).unwrap();
        assert_eq!(course.id().as_str(), "c-1");
        assert_eq!(course.topic_name(), "Rust");
        let chapter = &course.chapters()[0];
        assert_eq!(chapter.title(), "Ownership");
        assert_eq!(chapter.last_topic_index(), 1);
        assert!(chapter.topics()[0].has_quiz());
        assert!(!chapter.topics()[1].has_quiz());
        assert_eq!(chapter.topics()[0].questions()[0].correct_option(), 0);
        assert_eq!(chapter.topics()[0].content().sections.len(), 2);
    }

    #[test]
    fn rejects_course_without_chapters() {
        let err = Course::from_json(r#"{"_id":"c","title":"T","chapters":[]}"#).unwrap_err();
        assert_eq!(err, CurriculumError::NoChapters);
        assert!(err.is_malformed());
    }

    #[test]
    fn rejects_chapter_without_topics() {
        let err = Course::from_json(
            r#"{"_id":"c","title":"T","chapters":[{"chapterTitle":"a","topics":[{"title":"x"}]},{"chapterTitle":"b","topics":[]}]}"#,
        )
        .unwrap_err();
        assert_eq!(err, CurriculumError::EmptyChapter { chapter: 1 });
    }

    #[test]
    fn rejects_correct_index_outside_options() {
        let err = Course::from_json(
            r#"{"_id":"c","title":"T","chapters":[{"chapterTitle":"a","topics":[{"title":"x","quiz":{"questions":[{"question":"q","options":["a"],"correctOptionIndex":3}]}}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CurriculumError::CorrectOptionOutOfRange { index: 3, options: 1, .. }
        ));
    }

    #[test]
    fn rejects_unparseable_correct_index() {
        let err = Course::from_json(
            r#"{"_id":"c","title":"T","chapters":[{"chapterTitle":"a","topics":[{"title":"x","quiz":{"questions":[{"question":"q","options":["a"],"correctOptionIndex":"first"}]}}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CurriculumError::InvalidCorrectOption { .. }));
    }

    #[test]
    fn rejects_garbage_json() {
        assert!(matches!(
            Course::from_json("not json").unwrap_err(),
            CurriculumError::InvalidJson(_)
        ));
    }

    #[test]
    fn empty_quiz_counts_as_no_quiz() {
        let course = Course::from_json(
            r#"{"_id":"c","title":"T","chapters":[{"chapterTitle":"a","topics":[{"title":"x","quiz":{"questions":[]}}]}]}"#,
        )
        .unwrap();
        assert!(!course.chapters()[0].has_quiz());
    }
}
