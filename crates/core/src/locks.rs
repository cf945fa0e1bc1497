//! Per-event lock registry
//!
//! All inventory mutations for one event are serialized on that event's
//! lock. The database connection is only ever taken while an event lock is
//! held (or with no event lock at all), never the other way round. An
//! entry lives only while some caller holds or waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

#[derive(Debug, Default)]
pub(crate) struct EventLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl EventLocks {
    /// The lock guarding `event_id`, created on first use
    pub(crate) fn lock_for(&self, event_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(event_id).or_default().clone()
    }

    /// Hand back a lock taken with `lock_for`. The entry is dropped when
    /// no other caller holds or waits on it.
    pub(crate) fn release(&self, event_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only handed out under the map lock, so the count is stable here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&event_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_event_shares_lock() {
        let locks = EventLocks::default();
        let event = Uuid::new_v4();

        let a = locks.lock_for(event);
        let b = locks.lock_for(event);
        assert!(Arc::ptr_eq(&a, &b));

        let other = locks.lock_for(Uuid::new_v4());
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_entry_dropped_after_last_release() {
        let locks = EventLocks::default();
        let event = Uuid::new_v4();

        let a = locks.lock_for(event);
        let b = locks.lock_for(event);
        locks.release(event, a);
        assert_eq!(locks.len(), 1);

        // A later caller still shares the lock with `b`
        let c = locks.lock_for(event);
        assert!(Arc::ptr_eq(&b, &c));
        locks.release(event, c);
        locks.release(event, b);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn test_registry_stays_flat_over_many_events() {
        let locks = EventLocks::default();
        for _ in 0..1000 {
            let event = Uuid::new_v4();
            let lock = locks.lock_for(event);
            locks.release(event, lock);
        }
        assert_eq!(locks.len(), 0);
    }
}
