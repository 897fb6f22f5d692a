//! Coalescing registry for in-flight administrative actions.
//!
//! [`ActionDeduplicator::execute`] registers a logical key before spawning
//! the action; a second call with an equal key attaches its completion
//! callback to the already in-flight action instead of dispatching again.
//! When the action resolves, the entry is removed first and the shared
//! result is fanned out to every attached callback, so the registry size is
//! at most one per logical key and returns to zero once everything in
//! flight has resolved.
//!
//! There are no timeouts here; callers rely on cancellation of the action
//! itself.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;

type Completion = Box<dyn FnOnce(&Result<()>) + Send>;
type InFlight<K> = HashMap<K, Vec<Completion>>;

/// Collapses identical in-flight actions to a single dispatch.
pub struct ActionDeduplicator<K> {
    in_flight: Arc<Mutex<InFlight<K>>>,
}

impl<K> Default for ActionDeduplicator<K> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> ActionDeduplicator<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates an empty deduplicator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(in_flight: &Mutex<InFlight<K>>) -> MutexGuard<'_, InFlight<K>> {
        in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `action` for `key` unless an equal key is already in flight, in
    /// which case `on_complete` is attached to the existing dispatch.
    ///
    /// Every attached callback receives the one shared result when the
    /// action resolves.
    pub fn execute<F>(
        &self,
        key: K,
        action: F,
        on_complete: impl FnOnce(&Result<()>) + Send + 'static,
    ) where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        {
            let mut in_flight = Self::lock(&self.in_flight);
            if let Some(waiters) = in_flight.get_mut(&key) {
                waiters.push(Box::new(on_complete));
                return;
            }
            in_flight.insert(key.clone(), vec![Box::new(on_complete)]);
        }

        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let result = action.await;
            let waiters = Self::lock(&in_flight).remove(&key).unwrap_or_default();
            for waiter in waiters {
                waiter(&result);
            }
        });
    }

    /// Number of distinct logical keys currently in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        Self::lock(&self.in_flight).len()
    }

    /// Returns true when nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Self::lock(&self.in_flight).is_empty()
    }
}
