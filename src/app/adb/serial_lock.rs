use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One lock per device serial. Commands addressed to the same transport run one
/// at a time; different devices proceed in parallel.
#[derive(Default)]
pub struct SerialLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SerialLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, serial: &str) -> Arc<Mutex<()>> {
        let mut guard = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(serial.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` while holding the lock for `serial`.
    pub fn with_serial<T>(&self, serial: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(serial);
        // The guarded value is `()`, so a panic in another holder leaves nothing inconsistent.
        let _guard: MutexGuard<'_, ()> = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Drops registry entries for serials no longer in `keep`.
    pub fn retain(&self, keep: &[String]) {
        let mut guard = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|serial, lock| keep.contains(serial) || Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
