pub mod connection;
pub mod interview_sessions;
