//! Single-writer-per-path guard.
//!
//! The freshness check and the encode that follows it must not interleave
//! with another conversion of the same destination, or two workers could both
//! decide to encode and race on the rename. [`PathLocks`] tracks destinations
//! currently being processed; a second caller for the same path blocks until
//! the first drops its [`PathGuard`], then re-runs the freshness check and
//! usually finds a fresh file.
//!
//! Distinct paths never contend. Entries are removed when their guard drops,
//! so the set only ever holds paths with work in flight.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct PathLocks {
    in_flight: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other guard holds `path`, then take it.
    pub fn acquire(&self, path: &Path) -> PathGuard<'_> {
        let mut in_flight = self.lock_set();
        while in_flight.contains(path) {
            in_flight = self
                .released
                .wait(in_flight)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        in_flight.insert(path.to_path_buf());
        PathGuard {
            locks: self,
            path: path.to_path_buf(),
        }
    }

    /// Number of paths currently held.
    #[cfg(test)]
    pub(crate) fn in_flight_count(&self) -> usize {
        self.lock_set().len()
    }

    fn lock_set(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // A panic while holding the set cannot leave it inconsistent: every
        // critical section is a single insert, remove, or lookup.
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its path when dropped.
#[derive(Debug)]
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: PathBuf,
}

#[cfg(test)]
impl PathGuard<'_> {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.locks.lock_set().remove(&self.path);
        self.locks.released.notify_all();
    }
}
