//! One-shot work on a background thread.
//!
//! Effects that need expensive CPU preparation (for example expanding a LUT) spawn a
//! [`BackgroundTask`] and poll it once per frame. Until the result arrives the effect
//! renders in a degraded but valid state. Dropping the task discards the result; the
//! thread is not interrupted but its output goes nowhere.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};

use crate::error::TaskError;

/// What [`BackgroundTask::poll`] saw.
#[derive(Debug)]
pub enum TaskStatus<T> {
    Pending,
    Ready(T),
    Failed(TaskError),
    /// The result was already taken, or the task was cancelled.
    Finished,
}

type Outcome<T> = Result<T, TaskError>;

pub struct BackgroundTask<T> {
    name: String,
    rx: Option<Receiver<Outcome<T>>>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    /// Runs `work` on a new thread. Errors returned by `work` and panics inside it both
    /// surface as [`TaskStatus::Failed`].
    pub fn spawn<F>(name: impl Into<String>, work: F) -> Result<Self, TaskError>
    where
        F: FnOnce() -> Result<T, String> + Send + 'static,
    {
        let name = name.into();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let task_name = name.clone();

        thread::Builder::new()
            .name(format!("postfx-{name}"))
            .spawn(move || {
                let outcome = match catch_unwind(AssertUnwindSafe(work)) {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(reason)) => Err(TaskError::Failed {
                        name: task_name,
                        reason,
                    }),
                    Err(_) => Err(TaskError::Panicked { name: task_name }),
                };
                // The receiver is gone if the task was dropped.
                let _ = tx.send(outcome);
            })
            .map_err(|err| TaskError::Spawn {
                name: name.clone(),
                reason: err.to_string(),
            })?;

        log::debug!("spawned background task '{name}'");
        Ok(Self { name, rx: Some(rx) })
    }
}

impl<T> BackgroundTask<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-blocking. Returns the result exactly once.
    pub fn poll(&mut self) -> TaskStatus<T> {
        let Some(rx) = &self.rx else {
            return TaskStatus::Finished;
        };
        match rx.try_recv() {
            Ok(outcome) => {
                self.rx = None;
                match outcome {
                    Ok(value) => TaskStatus::Ready(value),
                    Err(err) => TaskStatus::Failed(err),
                }
            }
            Err(TryRecvError::Empty) => TaskStatus::Pending,
            Err(TryRecvError::Disconnected) => {
                self.rx = None;
                TaskStatus::Failed(TaskError::Panicked {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Blocks until the task is done.
    pub fn wait(mut self) -> Result<T, TaskError> {
        let rx = self.rx.take().ok_or_else(|| TaskError::Failed {
            name: self.name.clone(),
            reason: "result already taken".to_string(),
        })?;
        rx.recv().unwrap_or_else(|_| {
            Err(TaskError::Panicked {
                name: self.name.clone(),
            })
        })
    }

    /// Stops listening. The result, if it ever arrives, is dropped.
    pub fn cancel(&mut self) {
        if self.rx.take().is_some() {
            log::debug!("cancelled background task '{}'", self.name);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.rx.is_none()
    }
}
