#![forbid(unsafe_code)]

pub mod completion;
pub mod error;
pub mod events;
pub mod navigation;
pub mod progress_cache;
pub mod quiz_engine;
pub mod remote;
pub mod reports;

pub use learn_core::Clock;

pub use completion::{CompletionCheck, CompletionEvaluator, Evaluation};
pub use error::{
    CompletionError, NavigationError, ProgressCacheError, QuizEngineError, Redirect, RemoteError,
};
pub use events::{EventBus, LearningEvent};
pub use navigation::{LearningContext, NavState, NavigationController, NextOutcome, QuizAdvance};
pub use progress_cache::ProgressCache;
pub use quiz_engine::{AdvanceResult, QuizEngine, QuizPass};
pub use remote::{
    AnswerReport, CredentialProvider, HttpProgressRemote, InMemoryProgressRemote, ProgressRemote,
    RemoteCalls, RemoteConfig, RemoteMode, StaticCredential,
};
pub use reports::ReportDispatcher;
