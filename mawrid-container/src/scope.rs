//! Scopes: units of work that cache scoped instances and own their disposal.
//!
//! A scope holds one instance per scoped registration, the disposables it
//! is responsible for, callbacks to run when it ends and a small item bag.
//! Scopes nest: each one remembers the scope that was current when it began.
//!
//! Ending a scope runs every end-of-scope callback first (including ones
//! added while ending), then disposes tracked instances in reverse order of
//! registration. Each instance is disposed at most once, tracked by address.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{MawridError, Result};
use crate::instance::{Created, Disposable, DisposeHook, Instance};
use crate::key::TypeKey;
use crate::registration::RegistrationId;
use crate::scope_manager::ScopeManager;

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

type EndAction = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ScopeState {
    instances: HashMap<RegistrationId, Instance>,
    disposables: Vec<DisposeHook>,
    tracked: HashSet<usize>,
    end_actions: Vec<EndAction>,
    items: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

struct ScopeInner {
    id: u64,
    status: AtomicU8,
    parent: Option<Scope>,
    state: Mutex<ScopeState>,
}

/// Shared handle to one scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub(crate) fn new(parent: Option<Scope>) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Arc::new(ScopeInner {
                id: NEXT.fetch_add(1, Ordering::Relaxed),
                status: AtomicU8::new(ACTIVE),
                parent,
                state: Mutex::new(ScopeState::default()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The scope that was current when this one began.
    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.status.load(Ordering::Acquire) == DISPOSED
    }

    /// Returns the instance cached for `registration`, creating it first if
    /// needed.
    ///
    /// `create` runs without holding the scope's lock, so it may resolve other
    /// scoped services. If two callers race, the first stored instance wins.
    pub fn get_or_create(
        &self,
        registration: RegistrationId,
        service: TypeKey,
        create: impl FnOnce() -> Result<Created>,
    ) -> Result<Instance> {
        if self.is_disposed() {
            return Err(MawridError::activation(
                service,
                format!(
                    "{} can't be resolved because its scope has already been disposed",
                    service.short_name()
                ),
            ));
        }

        if let Some(instance) = self.inner.state.lock().instances.get(&registration) {
            return Ok(instance.clone());
        }

        let created = create()?;

        let mut state = self.inner.state.lock();
        if let Some(hook) = created.dispose {
            track(&mut state, created.instance.address(), hook);
        }
        let instance = state
            .instances
            .entry(registration)
            .or_insert(created.instance)
            .clone();
        trace!(scope = self.inner.id, service = %service, "Cached scoped instance");
        Ok(instance)
    }

    /// Disposes `value` when this scope ends.
    ///
    /// Registering the same instance twice still disposes it once.
    pub fn register_for_disposal<T: Disposable + 'static>(&self, value: Arc<T>) {
        let address = Arc::as_ptr(&value) as usize;
        let hook: DisposeHook = Arc::new(move || value.dispose());
        track(&mut self.inner.state.lock(), address, hook);
    }

    /// Runs `action` when this scope ends, before any instance is disposed.
    pub fn when_scope_ends(&self, action: impl FnOnce() + Send + 'static) {
        self.inner.state.lock().end_actions.push(Box::new(action));
    }

    /// Reads a value from the scope's item bag.
    pub fn get_item<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let item = self.inner.state.lock().items.get(key).cloned()?;
        item.downcast::<T>().ok()
    }

    /// Stores a value in the scope's item bag, replacing any previous one.
    pub fn set_item<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: Arc<T>) {
        self.inner.state.lock().items.insert(key.into(), value);
    }

    /// Ends the scope. Calling it again does nothing.
    pub fn dispose(&self) {
        if self
            .inner
            .status
            .compare_exchange(ACTIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let mut disposed = 0usize;
        loop {
            let actions = mem::take(&mut self.inner.state.lock().end_actions);
            if !actions.is_empty() {
                for action in actions {
                    action();
                }
                continue;
            }

            let disposables = mem::take(&mut self.inner.state.lock().disposables);
            if disposables.is_empty() {
                break;
            }
            disposed += disposables.len();
            for hook in disposables.into_iter().rev() {
                hook();
            }
        }

        {
            let mut state = self.inner.state.lock();
            state.instances.clear();
            state.items.clear();
        }
        self.inner.status.store(DISPOSED, Ordering::Release);
        debug!(scope = self.inner.id, disposed, "Scope disposed");
    }
}

fn track(state: &mut ScopeState, address: usize, hook: DisposeHook) {
    if state.tracked.insert(address) {
        state.disposables.push(hook);
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("parent", &self.parent().map(Scope::id))
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Ends its scope when dropped.
///
/// Returned by `begin_scope`. Dereferences to the [`Scope`].
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopeGuard {
    scope: Scope,
    manager: ScopeManager,
}

impl ScopeGuard {
    pub(crate) fn new(scope: Scope, manager: ScopeManager) -> Self {
        Self { scope, manager }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl Deref for ScopeGuard {
    type Target = Scope;

    fn deref(&self) -> &Scope {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.manager.end_scope(&self.scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Session {
        closed: Arc<AtomicUsize>,
    }

    impl Disposable for Session {
        fn dispose(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn created(value: u32) -> Result<Created> {
        Ok(Created::new(Instance::new(Arc::new(value))))
    }

    #[test]
    fn caches_per_registration() {
        let scope = Scope::new(None);
        let registration = RegistrationId::next();
        let service = TypeKey::of::<u32>();

        let a = scope.get_or_create(registration, service, || created(1)).unwrap();
        let b = scope.get_or_create(registration, service, || created(2)).unwrap();
        assert!(a.same(&b));

        let other = scope.get_or_create(RegistrationId::next(), service, || created(3)).unwrap();
        assert!(!a.same(&other));
    }

    #[test]
    fn disposes_each_instance_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let session = Arc::new(Session { closed: closed.clone() });
        let scope = Scope::new(None);

        scope.register_for_disposal(session.clone());
        scope.register_for_disposal(session);
        scope.dispose();
        scope.dispose();

        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(scope.is_disposed());
    }

    #[test]
    fn end_actions_run_before_disposal_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let scope = Scope::new(None);

        for name in ["first", "second"] {
            let log = log.clone();
            let hook: DisposeHook = Arc::new(move || log.lock().push(format!("dispose {name}")));
            let instance = Instance::new(Arc::new(name.to_string()));
            scope
                .get_or_create(RegistrationId::next(), TypeKey::of::<String>(), || {
                    Ok(Created::with_hook(instance, Some(hook)))
                })
                .unwrap();
        }

        {
            let log = log.clone();
            let nested = scope.clone();
            scope.when_scope_ends(move || {
                log.lock().push("end".to_string());
                let log = log.clone();
                nested.when_scope_ends(move || log.lock().push("late end".to_string()));
            });
        }

        scope.dispose();
        assert_eq!(
            *log.lock(),
            vec!["end", "late end", "dispose second", "dispose first"]
        );
    }

    #[test]
    fn disposed_scope_rejects_resolution() {
        let scope = Scope::new(None);
        scope.dispose();

        match scope.get_or_create(RegistrationId::next(), TypeKey::of::<u32>(), || created(1)) {
            Err(MawridError::Activation(e)) => assert!(e.message.contains("disposed")),
            other => panic!("Expected Activation, got: {other:?}"),
        }
    }

    #[test]
    fn items_are_typed() {
        let scope = Scope::new(None);
        scope.set_item("user", Arc::new(String::from("amira")));

        assert_eq!(scope.get_item::<String>("user").as_deref().map(String::as_str), Some("amira"));
        assert!(scope.get_item::<u32>("user").is_none());
        assert!(scope.get_item::<String>("missing").is_none());
    }
}
