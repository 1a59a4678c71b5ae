//! Per-producer reentrancy guard.
//!
//! A producer starts out unvalidated. While a thread builds or resolves it,
//! that thread is recorded as validating; seeing the same thread come back
//! means the graph refers to itself. After the first successful resolution
//! the producer is valid for good and the guard costs one atomic load.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{CyclicDependencyError, MawridError, Result};
use crate::key::TypeKey;

#[derive(Debug, Default)]
pub(crate) struct CycleGuard {
    valid: AtomicBool,
    validating: Mutex<HashSet<ThreadId>>,
}

/// Marks the current thread as validating until dropped.
///
/// Dropping it on an error path resets the producer to unvalidated.
pub(crate) struct Entered<'a> {
    guard: &'a CycleGuard,
    thread: ThreadId,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// One-way: a valid producer never goes back to being checked.
    pub fn mark_valid(&self) {
        self.valid.store(true, Ordering::Release);
    }

    /// Enters `service` on the current thread.
    ///
    /// Returns `None` once the producer is valid.
    pub fn enter(&self, service: TypeKey) -> Result<Option<Entered<'_>>> {
        if self.is_valid() {
            return Ok(None);
        }

        let thread = thread::current().id();
        if !self.validating.lock().insert(thread) {
            warn!(service = %service, "Cyclic dependency detected");
            return Err(MawridError::CyclicDependency(CyclicDependencyError {
                path: vec![service],
            }));
        }

        Ok(Some(Entered { guard: self, thread }))
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.guard.validating.lock().remove(&self.thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    struct Service;

    #[test]
    fn reentry_on_same_thread_is_a_cycle() {
        let guard = CycleGuard::new();
        let _outer = guard.enter(TypeKey::of::<Service>()).unwrap();

        match guard.enter(TypeKey::of::<Service>()) {
            Err(MawridError::CyclicDependency(e)) => assert_eq!(e.path, vec![TypeKey::of::<Service>()]),
            Err(other) => panic!("Expected CyclicDependency, got: {other:?}"),
            Ok(_) => panic!("Expected CyclicDependency, got Ok"),
        }
    }

    #[test]
    fn leaving_resets_to_unvalidated() {
        let guard = CycleGuard::new();
        drop(guard.enter(TypeKey::of::<Service>()).unwrap());
        assert!(guard.enter(TypeKey::of::<Service>()).unwrap().is_some());
    }

    #[test]
    fn valid_guard_is_not_tracked() {
        let guard = CycleGuard::new();
        guard.mark_valid();
        let _outer = guard.enter(TypeKey::of::<Service>()).unwrap();
        assert!(guard.enter(TypeKey::of::<Service>()).unwrap().is_none());
    }

    #[test]
    fn threads_do_not_see_each_other() {
        let guard = Arc::new(CycleGuard::new());
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let guard = guard.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let entered = guard.enter(TypeKey::of::<Service>()).unwrap();
                    let tracked = entered.is_some();
                    barrier.wait();
                    drop(entered);
                    tracked
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
