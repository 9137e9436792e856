#![forbid(unsafe_code)]

pub mod completion;
pub mod curriculum;
pub mod error;
pub mod model;
pub mod time;

pub use curriculum::{ChapterQuestion, CurriculumStore};
pub use error::Error;
pub use time::Clock;
