//! Client-side autosave for one interview session.
//!
//! Edits land in local state at once and mark their question dirty. After the
//! debounce window goes quiet the dirty questions are saved one at a time,
//! each against the latest acknowledged token. A conflict halts autosave
//! until a human picks a side with [`AutosaveController::resolve_conflict`];
//! the controller never merges on its own.

pub mod saver;

pub use saver::{AnswerSaver, LocalAnswerSaver};

use crate::domain::answer::{validate_question_id, AnswerPatch, AnswerValue, Answers};
use crate::domain::error::{AppError, Result};
use crate::domain::interview_session::{DiffSaveOutcome, SessionSnapshot};
use crate::infrastructure::config::AutosaveConfig;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveStatus {
    Idle,
    Saving,
    Saved,
    Conflict,
    Error(String),
}

struct LocalState {
    answers: Answers,
    updated_at: DateTime<Utc>,
    version: i64,
    /// Unique question ids in first-edit order.
    dirty: Vec<String>,
    in_flight: bool,
    flush_requested: bool,
    conflict: Option<SessionSnapshot>,
}

impl LocalState {
    fn mark_dirty(&mut self, question_id: &str) {
        if !self.dirty.iter().any(|id| id == question_id) {
            self.dirty.push(question_id.to_string());
        }
    }

    /// Put unsent questions back ahead of anything edited meanwhile.
    fn requeue_front(&mut self, unsent: &[String]) {
        let mut dirty: Vec<String> = unsent.to_vec();
        for id in self.dirty.drain(..) {
            if !dirty.contains(&id) {
                dirty.push(id);
            }
        }
        self.dirty = dirty;
    }
}

enum BatchEnd {
    Completed,
    Conflicted(SessionSnapshot, usize),
    Failed(String, usize),
    /// The controller was dropped before the request at this index went out.
    Stopped(usize),
}

struct Inner {
    session_id: String,
    saver: Arc<dyn AnswerSaver>,
    config: AutosaveConfig,
    state: Mutex<LocalState>,
    status: watch::Sender<AutosaveStatus>,
    debounce: std::sync::Mutex<Option<JoinHandle<()>>>,
    saved_generation: AtomicU64,
    closed: AtomicBool,
}

pub struct AutosaveController {
    inner: Arc<Inner>,
}

impl AutosaveController {
    /// Start from the session as last read from the server.
    pub fn new(
        saver: Arc<dyn AnswerSaver>,
        snapshot: SessionSnapshot,
        config: AutosaveConfig,
    ) -> Self {
        let (status, _) = watch::channel(AutosaveStatus::Idle);
        Self {
            inner: Arc::new(Inner {
                session_id: snapshot.id,
                saver,
                config,
                state: Mutex::new(LocalState {
                    answers: snapshot.answers,
                    updated_at: snapshot.updated_at,
                    version: snapshot.version,
                    dirty: Vec::new(),
                    in_flight: false,
                    flush_requested: false,
                    conflict: None,
                }),
                status,
                debounce: std::sync::Mutex::new(None),
                saved_generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn status(&self) -> AutosaveStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveStatus> {
        self.inner.status.subscribe()
    }

    pub async fn answers(&self) -> Answers {
        self.inner.state.lock().await.answers.clone()
    }

    /// Last acknowledged `(updated_at, version)`.
    pub async fn token(&self) -> (DateTime<Utc>, i64) {
        let state = self.inner.state.lock().await;
        (state.updated_at, state.version)
    }

    pub async fn pending(&self) -> Vec<String> {
        self.inner.state.lock().await.dirty.clone()
    }

    /// The server row returned with the last conflict, while unresolved.
    pub async fn conflict(&self) -> Option<SessionSnapshot> {
        self.inner.state.lock().await.conflict.clone()
    }

    /// Record an edit. A blank value (`None`, null, `""`) clears the answer.
    pub async fn set_answer(&self, question_id: &str, value: Option<AnswerValue>) -> Result<()> {
        validate_question_id(question_id)?;

        let halted = {
            let mut state = self.inner.state.lock().await;
            match value {
                Some(value) if !value.is_blank() => {
                    state.answers.insert(question_id.to_string(), value);
                }
                _ => {
                    state.answers.remove(question_id);
                }
            }
            state.mark_dirty(question_id);
            state.conflict.is_some()
        };

        if halted {
            debug!(session_id = %self.inner.session_id, question_id, "Edit kept locally, autosave halted by conflict");
        } else {
            self.inner.arm_debounce();
        }
        Ok(())
    }

    /// Flush the dirty queue now, e.g. after an error.
    pub async fn retry(&self) {
        self.inner.cancel_debounce();
        self.inner.clone().flush().await;
    }

    /// `use_latest` takes the server's answers; otherwise local answers stay.
    /// Either way the server token is adopted and the dirty queue is dropped.
    pub async fn resolve_conflict(&self, use_latest: bool) -> Result<()> {
        self.inner.cancel_debounce();
        let mut state = self.inner.state.lock().await;
        let snapshot = state
            .conflict
            .take()
            .ok_or_else(|| AppError::ValidationError("No conflict to resolve".to_string()))?;

        if use_latest {
            state.answers = snapshot.answers;
        }
        state.updated_at = snapshot.updated_at;
        state.version = snapshot.version;
        state.dirty.clear();
        state.flush_requested = false;
        drop(state);

        self.inner.status.send_replace(AutosaveStatus::Idle);
        Ok(())
    }
}

impl Drop for AutosaveController {
    fn drop(&mut self) {
        // A save already on the wire is left to finish; nothing new is sent.
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.cancel_debounce();
    }
}

impl Inner {
    fn arm_debounce(self: &Arc<Self>) {
        let inner = self.clone();
        let delay = self.config.debounce();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached so that re-arming the timer cannot cancel a running batch.
            tokio::spawn(inner.flush());
        });

        if let Ok(mut slot) = self.debounce.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        } else {
            handle.abort();
        }
    }

    fn cancel_debounce(&self) {
        if let Ok(mut slot) = self.debounce.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }

    fn flush(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self.run_flush())
    }

    async fn run_flush(self: Arc<Self>) {
        if self.is_closed() {
            return;
        }
        let batch = {
            let mut state = self.state.lock().await;
            if state.conflict.is_some() || state.dirty.is_empty() {
                return;
            }
            if state.in_flight {
                state.flush_requested = true;
                return;
            }
            state.in_flight = true;
            std::mem::take(&mut state.dirty)
        };

        self.status.send_replace(AutosaveStatus::Saving);
        let end = self.save_batch(&batch).await;

        let flush_again = {
            let mut state = self.state.lock().await;
            state.in_flight = false;
            let requested = std::mem::take(&mut state.flush_requested);

            match end {
                BatchEnd::Completed => {
                    self.mark_saved();
                    requested && !state.dirty.is_empty()
                }
                BatchEnd::Conflicted(snapshot, index) => {
                    warn!(
                        session_id = %self.session_id,
                        question_id = %batch[index],
                        latest_version = snapshot.version,
                        "Autosave halted by conflict"
                    );
                    state.requeue_front(&batch[index..]);
                    state.conflict = Some(snapshot);
                    self.status.send_replace(AutosaveStatus::Conflict);
                    false
                }
                BatchEnd::Failed(message, index) => {
                    warn!(
                        session_id = %self.session_id,
                        question_id = %batch[index],
                        error = %message,
                        "Autosave failed"
                    );
                    state.requeue_front(&batch[index..]);
                    self.status.send_replace(AutosaveStatus::Error(message));
                    false
                }
                BatchEnd::Stopped(index) => {
                    state.requeue_front(&batch[index..]);
                    false
                }
            }
        };

        if flush_again && !self.is_closed() {
            tokio::spawn(self.flush());
        }
    }

    async fn save_batch(&self, batch: &[String]) -> BatchEnd {
        for (index, question_id) in batch.iter().enumerate() {
            if self.is_closed() {
                return BatchEnd::Stopped(index);
            }
            let (patch, token) = {
                let state = self.state.lock().await;
                (
                    AnswerPatch::from_local(state.answers.get(question_id)),
                    state.updated_at,
                )
            };

            match self
                .saver
                .save_answer(&self.session_id, question_id, &patch, token)
                .await
            {
                Ok(DiffSaveOutcome::Applied {
                    updated_at,
                    version,
                }) => {
                    let mut state = self.state.lock().await;
                    state.updated_at = updated_at;
                    state.version = version;
                    debug!(session_id = %self.session_id, question_id = %question_id, version, "Autosaved answer");
                }
                Ok(DiffSaveOutcome::Conflicted(snapshot)) => {
                    return BatchEnd::Conflicted(snapshot, index);
                }
                Err(err) => return BatchEnd::Failed(err.to_string(), index),
            }
        }
        BatchEnd::Completed
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn mark_saved(self: &Arc<Self>) {
        let generation = self.saved_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(AutosaveStatus::Saved);

        let inner = self.clone();
        let delay = self.config.saved_reset();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.saved_generation.load(Ordering::SeqCst) == generation {
                inner.status.send_if_modified(|status| {
                    if *status == AutosaveStatus::Saved {
                        *status = AutosaveStatus::Idle;
                        true
                    } else {
                        false
                    }
                });
            }
        });
    }
}
