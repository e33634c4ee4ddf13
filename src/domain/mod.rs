pub mod answer;
pub mod caller;
pub mod error;
pub mod interview_session;
pub mod session_store;
