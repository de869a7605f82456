//! Per-library indexing lock.
//!
//! One library may have at most one indexing job in flight; a concurrent
//! second attempt is rejected with `LibraryBusy` rather than queued
//! (core spec §5). Cross-library indexing proceeds in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::errors::CoreError;

#[derive(Default)]
pub struct LibraryLockTable {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the lifetime of one indexing job; dropping it releases the lock.
pub struct LibraryLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl LibraryLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, library_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .unwrap()
            .entry(library_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Attempts to acquire the lock without waiting; fails fast with
    /// `LibraryBusy` on contention rather than queueing the caller.
    pub fn try_acquire(&self, library_id: &str) -> Result<LibraryLockGuard, CoreError> {
        let mutex = self.entry(library_id);
        match mutex.try_lock_owned() {
            Ok(guard) => Ok(LibraryLockGuard { _guard: guard }),
            Err(_) => Err(CoreError::LibraryBusy(library_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_library_is_busy() {
        let table = LibraryLockTable::new();
        let _first = table.try_acquire("lib1").unwrap();
        let second = table.try_acquire("lib1");
        assert!(second.is_err());
    }

    #[test]
    fn different_libraries_do_not_contend() {
        let table = LibraryLockTable::new();
        let _a = table.try_acquire("lib1").unwrap();
        let b = table.try_acquire("lib2");
        assert!(b.is_ok());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let table = LibraryLockTable::new();
        {
            let _first = table.try_acquire("lib1").unwrap();
        }
        let second = table.try_acquire("lib1");
        assert!(second.is_ok());
    }
}
