//! Current-state holder with listener fan-out and state-update tasks.
//!
//! [`ClusterService`] owns the current [`ClusterState`] snapshot. New states
//! arrive either wholesale (applier path, [`ClusterService::apply_state`]) or
//! as a [`ClusterStateUpdateTask`] transform. Tasks are pure `state -> state`
//! functions; their completion listener is driven by the publication
//! machinery, never by the transform itself.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::cluster::ClusterState;
use crate::error::{Error, Result};

/// A published cluster-state change.
#[derive(Debug, Clone)]
pub struct ClusterChangedEvent {
    /// State before the change.
    pub previous: Arc<ClusterState>,
    /// State after the change.
    pub state: Arc<ClusterState>,
}

/// Observer of published cluster-state changes.
pub trait ClusterStateListener: Send + Sync {
    /// Called after a new state has been published.
    fn cluster_changed(&self, event: &ClusterChangedEvent);
}

/// A cluster-state update applied and published by the [`ClusterService`].
///
/// `execute` must be a pure transform. Exactly one of
/// `cluster_state_published` or `on_failure` is invoked per submission, and
/// only by the service.
pub trait ClusterStateUpdateTask: Send + Sync {
    /// Produces the next state from the current one.
    ///
    /// # Errors
    ///
    /// Returns an error if the transform cannot be applied; the service then
    /// routes it to [`ClusterStateUpdateTask::on_failure`].
    fn execute(&self, state: &ClusterState) -> Result<ClusterState>;

    /// Acknowledgment that the new state has been published.
    fn cluster_state_published(&self);

    /// Failure path, invoked when `execute` or publication fails.
    fn on_failure(&self, error: Error);
}

/// Holds the current cluster state and fans out changes.
pub struct ClusterService {
    state: RwLock<Arc<ClusterState>>,
    listeners: Mutex<Vec<Arc<dyn ClusterStateListener>>>,
}

impl ClusterService {
    /// Creates a service seeded with `initial` state.
    #[must_use]
    pub fn new(initial: ClusterState) -> Self {
        Self {
            state: RwLock::new(Arc::new(initial)),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current state snapshot.
    #[must_use]
    pub fn state(&self) -> Arc<ClusterState> {
        Arc::clone(
            &self
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Registers a listener for future state changes.
    pub fn add_listener(&self, listener: Arc<dyn ClusterStateListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Publishes `next` as the new cluster state, bumping the version and
    /// notifying listeners.
    pub fn apply_state(&self, next: ClusterState) {
        let (previous, published) = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let previous = Arc::clone(&guard);
            let mut next = next;
            next.version = previous.version + 1;
            let published = Arc::new(next);
            *guard = Arc::clone(&published);
            (previous, published)
        };
        self.notify(previous, published);
    }

    /// Runs `task` against the current state and publishes the result.
    ///
    /// On success the new state is published, listeners are notified, and
    /// the task is acknowledged via `cluster_state_published`. On failure
    /// the state is left untouched and `on_failure` is invoked once.
    pub fn submit_state_update(&self, task: Arc<dyn ClusterStateUpdateTask>) {
        let outcome = {
            let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let previous = Arc::clone(&guard);
            match task.execute(&previous) {
                Ok(mut next) => {
                    next.version = previous.version + 1;
                    let published = Arc::new(next);
                    *guard = Arc::clone(&published);
                    Ok((previous, published))
                }
                Err(error) => Err(error),
            }
        };

        match outcome {
            Ok((previous, published)) => {
                self.notify(previous, published);
                task.cluster_state_published();
            }
            Err(error) => {
                tracing::error!(error = %error, "cluster state update task failed");
                task.on_failure(error);
            }
        }
    }

    fn notify(&self, previous: Arc<ClusterState>, state: Arc<ClusterState>) {
        let event = ClusterChangedEvent { previous, state };
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.cluster_changed(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cluster::{ClusterMetadata, ClusterNodes};

    struct CountingListener {
        seen: AtomicUsize,
    }

    impl ClusterStateListener for CountingListener {
        fn cluster_changed(&self, event: &ClusterChangedEvent) {
            assert!(event.state.version > event.previous.version);
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct VersionBumpTask {
        published: AtomicUsize,
        failed: AtomicUsize,
        fail: bool,
    }

    impl ClusterStateUpdateTask for VersionBumpTask {
        fn execute(&self, state: &ClusterState) -> Result<ClusterState> {
            if self.fail {
                return Err(Error::StateUpdate {
                    message: "injected".to_string(),
                });
            }
            Ok(state.clone())
        }

        fn cluster_state_published(&self) {
            self.published.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _error: Error) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn initial_state() -> ClusterState {
        ClusterState {
            version: 0,
            nodes: ClusterNodes::local_master("node-0"),
            metadata: ClusterMetadata::default(),
        }
    }

    #[test]
    fn apply_state_bumps_version_and_notifies() {
        let service = ClusterService::new(initial_state());
        let listener = Arc::new(CountingListener {
            seen: AtomicUsize::new(0),
        });
        service.add_listener(Arc::clone(&listener) as Arc<dyn ClusterStateListener>);

        service.apply_state(initial_state());
        service.apply_state(initial_state());

        assert_eq!(service.state().version, 2);
        assert_eq!(listener.seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn update_task_published_exactly_once() {
        let service = ClusterService::new(initial_state());
        let task = Arc::new(VersionBumpTask {
            published: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            fail: false,
        });
        service.submit_state_update(Arc::clone(&task) as Arc<dyn ClusterStateUpdateTask>);

        assert_eq!(task.published.load(Ordering::SeqCst), 1);
        assert_eq!(task.failed.load(Ordering::SeqCst), 0);
        assert_eq!(service.state().version, 1);
    }

    #[test]
    fn failed_update_leaves_state_untouched() {
        let service = ClusterService::new(initial_state());
        let task = Arc::new(VersionBumpTask {
            published: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            fail: true,
        });
        service.submit_state_update(Arc::clone(&task) as Arc<dyn ClusterStateUpdateTask>);

        assert_eq!(task.published.load(Ordering::SeqCst), 0);
        assert_eq!(task.failed.load(Ordering::SeqCst), 1);
        assert_eq!(service.state().version, 0);
    }
}
