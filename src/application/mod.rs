pub mod use_cases;

pub use use_cases::autosave::{AnswerSaver, AutosaveController, AutosaveStatus, LocalAnswerSaver};
pub use use_cases::diff_save::{DiffSaveCommand, DiffSaveUseCase};
pub use use_cases::interview_session::InterviewSessionUseCase;
pub use use_cases::rate_limiter::RateLimiter;
