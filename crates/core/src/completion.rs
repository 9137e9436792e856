//! Course completion eligibility and mastery figures.

use crate::curriculum::CurriculumStore;
use crate::model::ProgressRecord;

/// True when every quiz-bearing topic of the course has its quiz passed.
///
/// Topics without quiz content are vacuously satisfied, so a course with no
/// quizzes at all is eligible immediately.
#[must_use]
pub fn is_eligible(record: &ProgressRecord, curriculum: &CurriculumStore) -> bool {
    curriculum
        .quiz_topic_keys()
        .all(|key| record.is_quiz_passed(key))
}

/// Aggregate figures for progress gauges and the certification screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterySummary {
    pub quiz_topics: usize,
    pub passed_topics: usize,
    pub attempted: u32,
    pub correct: u32,
    pub progress_percent: u8,
    pub accuracy_percent: u8,
}

impl MasterySummary {
    /// Only quiz-bearing topics count towards the totals.
    #[must_use]
    pub fn compute(record: &ProgressRecord, curriculum: &CurriculumStore) -> Self {
        let mut quiz_topics = 0_usize;
        let mut passed_topics = 0_usize;
        let mut attempted = 0_u32;
        let mut correct = 0_u32;
        for key in curriculum.quiz_topic_keys() {
            quiz_topics += 1;
            if let Some(entry) = record.topic(key) {
                attempted = attempted.saturating_add(entry.attempted_count);
                correct = correct.saturating_add(entry.correct_count);
                if entry.quiz_passed {
                    passed_topics += 1;
                }
            }
        }
        Self {
            quiz_topics,
            passed_topics,
            attempted,
            correct,
            progress_percent: percent(passed_topics as u64, quiz_topics as u64),
            accuracy_percent: percent(u64::from(correct), u64::from(attempted)),
        }
    }

    /// `passed/total` label for quiz modules.
    #[must_use]
    pub fn modules_label(&self) -> String {
        format!("{}/{}", self.passed_topics, self.quiz_topics)
    }
}

fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let rounded = (part * 100 + whole / 2) / whole;
    u8::try_from(rounded.min(100)).unwrap_or(100)
}
