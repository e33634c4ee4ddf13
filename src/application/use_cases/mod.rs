pub mod autosave;
pub mod diff_save;
pub mod interview_session;
pub mod rate_limiter;
