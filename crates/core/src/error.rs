use thiserror::Error;

use crate::model::{CurriculumError, ProgressError, QuizError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
}
