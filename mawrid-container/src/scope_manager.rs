//! Ambient scope tracking.
//!
//! Each container owns a [`ScopeManager`]. The manager keeps a pointer to
//! the current scope per thread, or per task inside [`ScopeManager::flow`]
//! when the `async` feature is on. Managers never share state, so two
//! containers on one thread have independent current scopes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::scope::{Scope, ScopeGuard};

type Store = HashMap<u64, Scope>;

thread_local! {
    static THREAD_SCOPES: RefCell<Store> = RefCell::new(HashMap::new());
}

#[cfg(feature = "async")]
tokio::task_local! {
    static TASK_SCOPES: RefCell<Store>;
}

#[cfg(feature = "async")]
fn with_store<R>(f: impl FnOnce(&mut Store) -> R) -> R {
    if TASK_SCOPES.try_with(|_| ()).is_ok() {
        TASK_SCOPES.with(|store| f(&mut store.borrow_mut()))
    } else {
        THREAD_SCOPES.with(|store| f(&mut store.borrow_mut()))
    }
}

#[cfg(not(feature = "async"))]
fn with_store<R>(f: impl FnOnce(&mut Store) -> R) -> R {
    THREAD_SCOPES.with(|store| f(&mut store.borrow_mut()))
}

/// Tracks the ambient scope for one container.
#[derive(Debug, Clone)]
pub struct ScopeManager {
    id: u64,
}

impl ScopeManager {
    pub(crate) fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// The innermost scope that has not been disposed.
    pub fn current(&self) -> Option<Scope> {
        with_store(|store| {
            let head = store.get(&self.id)?.clone();
            let live = first_live(Some(head.clone()));
            if live.as_ref() != Some(&head) {
                match &live {
                    Some(scope) => store.insert(self.id, scope.clone()),
                    None => store.remove(&self.id),
                };
            }
            live
        })
    }

    /// Starts a scope nested in the current one and makes it current.
    pub fn begin_scope(&self) -> ScopeGuard {
        let scope = Scope::new(self.current());
        with_store(|store| store.insert(self.id, scope.clone()));
        debug!(scope = scope.id(), parent = ?scope.parent().map(Scope::id), "Scope started");
        ScopeGuard::new(scope, self.clone())
    }

    /// Ends `scope` and disposes it.
    ///
    /// The current pointer rolls back to the parent only when `scope` is
    /// current or one of its ancestors; ending an unrelated scope (begun on
    /// another thread, or ended out of order) leaves it alone.
    pub fn end_scope(&self, scope: &Scope) {
        with_store(|store| {
            let in_chain = {
                let mut cursor = store.get(&self.id);
                loop {
                    match cursor {
                        Some(current) if current == scope => break true,
                        Some(current) => cursor = current.parent(),
                        None => break false,
                    }
                }
            };
            if in_chain {
                match first_live(scope.parent().cloned()) {
                    Some(parent) => store.insert(self.id, parent),
                    None => store.remove(&self.id),
                };
            }
        });
        scope.dispose();
    }

    /// Runs `future` with its own ambient store, seeded from the caller's.
    ///
    /// Scopes begun inside the future follow the task across threads and
    /// are invisible outside it.
    #[cfg(feature = "async")]
    pub async fn flow<F: std::future::Future>(&self, future: F) -> F::Output {
        let seed = with_store(|store| store.clone());
        TASK_SCOPES.scope(RefCell::new(seed), future).await
    }
}

fn first_live(mut cursor: Option<Scope>) -> Option<Scope> {
    while let Some(scope) = cursor {
        if !scope.is_disposed() {
            return Some(scope);
        }
        cursor = scope.parent().cloned();
    }
    None
}
