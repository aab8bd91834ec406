//! Per-table expiry timers.

use crate::registry::TableKey;
use commonware_runtime::{Clock, Handle, Metrics, Spawner};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tracing::trace;

struct Timer {
    session: u64,
    handle: Handle<()>,
}

/// One pending timer per table, tagged with the session it belongs to.
pub struct Scheduler<E: Spawner + Clock + Metrics> {
    context: E,
    ttl: Duration,
    timers: Arc<Mutex<HashMap<TableKey, Timer>>>,
}

impl<E: Spawner + Clock + Metrics> Scheduler<E> {
    pub fn new(context: E, ttl: Duration) -> Self {
        Self {
            context,
            ttl,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Run `fire` once `ttl` has elapsed, unless cancelled first. Replaces (and aborts)
    /// any timer already pending for `key`.
    pub fn schedule<F, Fut>(&self, key: TableKey, session: u64, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let ttl = self.ttl;
        let timers = self.timers.clone();
        let task_key = key.clone();

        // Held until the timer is registered so the task cannot observe the map first
        let mut pending = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = self
            .context
            .with_label("expiry")
            .spawn(move |context| async move {
                context.sleep(ttl).await;
                {
                    let mut timers = timers.lock().unwrap_or_else(PoisonError::into_inner);
                    if timers
                        .get(&task_key)
                        .is_some_and(|timer| timer.session == session)
                    {
                        timers.remove(&task_key);
                    }
                }
                trace!(table = %task_key, session, "expiry timer fired");
                fire().await;
            });
        if let Some(previous) = pending.insert(key, Timer { session, handle }) {
            previous.handle.abort();
        }
    }

    /// Abort the pending timer for `session`, if it is still armed.
    pub fn cancel(&self, key: &TableKey, session: u64) -> bool {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        match timers.get(key) {
            Some(timer) if timer.session == session => {
                if let Some(timer) = timers.remove(key) {
                    timer.handle.abort();
                }
                true
            }
            _ => false,
        }
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_runtime::{deterministic, Runner};
    use parlor_types::execution::AccountId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(player: &str) -> TableKey {
        TableKey::new("chat", AccountId::new(player))
    }

    #[test]
    fn test_timer_fires_after_ttl() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let scheduler = Scheduler::new(context.clone(), Duration::from_secs(120));
            let fired = Arc::new(AtomicUsize::new(0));
            let counter = fired.clone();
            scheduler.schedule(key("alice"), 1, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(scheduler.pending(), 1);

            context.sleep(Duration::from_secs(119)).await;
            assert_eq!(fired.load(Ordering::SeqCst), 0);

            context.sleep(Duration::from_secs(2)).await;
            assert_eq!(fired.load(Ordering::SeqCst), 1);
            assert_eq!(scheduler.pending(), 0);
        });
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let scheduler = Scheduler::new(context.clone(), Duration::from_secs(5));
            let fired = Arc::new(AtomicUsize::new(0));
            let counter = fired.clone();
            scheduler.schedule(key("alice"), 1, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });

            // Wrong session id is ignored
            assert!(!scheduler.cancel(&key("alice"), 2));
            assert!(scheduler.cancel(&key("alice"), 1));
            assert!(!scheduler.cancel(&key("alice"), 1));

            context.sleep(Duration::from_secs(10)).await;
            assert_eq!(fired.load(Ordering::SeqCst), 0);
            assert_eq!(scheduler.pending(), 0);
        });
    }

    #[test]
    fn test_reschedule_replaces_previous_timer() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let scheduler = Scheduler::new(context.clone(), Duration::from_secs(5));
            let fired = Arc::new(Mutex::new(Vec::new()));
            for session in [1u64, 2] {
                let fired = fired.clone();
                scheduler.schedule(key("alice"), session, move || async move {
                    fired.lock().unwrap().push(session);
                });
            }
            scheduler.schedule(key("bob"), 3, {
                let fired = fired.clone();
                move || async move {
                    fired.lock().unwrap().push(3);
                }
            });
            assert_eq!(scheduler.pending(), 2);

            context.sleep(Duration::from_secs(6)).await;
            let mut fired = fired.lock().unwrap().clone();
            fired.sort();
            assert_eq!(fired, vec![2, 3]);
        });
    }
}
