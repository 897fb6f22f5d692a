//! Fixed-delay scheduling behind a trait.
//!
//! The scaling controller ticks on a fixed delay; this module isolates it
//! from the runtime so the shutdown-rejection contract can be expressed and
//! tested. A rejection with [`ScheduleError::Shutdown`] is swallowable by
//! callers; every other rejection must propagate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors raised when scheduling a recurring task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The scheduler is shutting down; callers swallow this.
    #[error("scheduler is shut down")]
    Shutdown,

    /// Any other rejection; callers must propagate this.
    #[error("schedule rejected: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },
}

/// Handle to a scheduled recurring task.
///
/// Cancelling is idempotent. Dropping the handle does not cancel the task;
/// owners must call [`ScheduleHandle::cancel`] explicitly.
#[derive(Debug)]
pub struct ScheduleHandle {
    cancelled: Arc<AtomicBool>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl ScheduleHandle {
    /// Creates a handle wrapping a spawned scheduling loop.
    #[must_use]
    pub fn new(join: tokio::task::JoinHandle<()>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            join: Some(join),
        }
    }

    /// Creates a handle with no backing task, for schedulers that track
    /// their ticks elsewhere (test doubles).
    #[must_use]
    pub fn detached() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            join: None,
        }
    }

    /// Cancels the schedule. Safe to call more than once.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            if let Some(join) = &self.join {
                join.abort();
            }
        }
    }

    /// Returns true once [`ScheduleHandle::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Scheduler of recurring tasks with a fixed delay between runs.
pub trait Scheduler: Send + Sync {
    /// Schedules `task` to run every `interval`, starting after one
    /// `interval` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Shutdown`] when the backing executor is
    /// shutting down, or [`ScheduleError::Rejected`] for any other refusal.
    fn schedule_with_fixed_delay(
        &self,
        interval: Duration,
        task: Box<dyn Fn() + Send + Sync>,
    ) -> Result<ScheduleHandle, ScheduleError>;
}

/// Tokio-backed [`Scheduler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_with_fixed_delay(
        &self,
        interval: Duration,
        task: Box<dyn Fn() + Send + Sync>,
    ) -> Result<ScheduleHandle, ScheduleError> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return Err(ScheduleError::Shutdown);
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let join = runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                task();
            }
        });

        Ok(ScheduleHandle {
            cancelled,
            join: Some(join),
        })
    }
}
