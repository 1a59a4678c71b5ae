//! Type-erased shared instances.
//!
//! Every value that moves through a construction plan is an [`Instance`]:
//! an `Arc<S>` for some service type `S` (sized or not), boxed behind
//! `dyn Any`. The address of the `S` value is captured up front so scopes
//! can track instances by identity without knowing their type.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{MawridError, Result};

/// Releases resources held by a component.
///
/// Scoped instances are disposed when their scope ends, singletons when the
/// container is disposed. Transient instances are never tracked.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// Cleanup callback attached to one concrete instance.
pub type DisposeHook = Arc<dyn Fn() + Send + Sync>;

/// A shared, type-erased service instance.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    address: usize,
    type_name: &'static str,
}

impl Instance {
    /// Erases an `Arc<S>`.
    pub fn new<S: ?Sized + Send + Sync + 'static>(value: Arc<S>) -> Self {
        let address = Arc::as_ptr(&value).cast::<()>() as usize;
        Self {
            value: Arc::new(value),
            address,
            type_name: type_name::<S>(),
        }
    }

    /// Recovers the `Arc<S>` if this instance holds one.
    pub fn downcast<S: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.value.downcast_ref::<Arc<S>>().cloned()
    }

    /// Like [`downcast`](Self::downcast) but reports a type mismatch.
    pub fn expect<S: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<S>> {
        self.downcast::<S>().ok_or(MawridError::TypeMismatch {
            expected: type_name::<S>(),
            found: self.type_name,
        })
    }

    /// Address of the underlying value, used as its identity.
    #[inline]
    pub fn address(&self) -> usize {
        self.address
    }

    /// Returns `true` if both handles point at the same value.
    #[inline]
    pub fn same(&self, other: &Instance) -> bool {
        self.address == other.address && self.type_name == other.type_name
    }

    /// Name of the service type this instance was erased from.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({} @ {:#x})", self.type_name, self.address)
    }
}

/// Output of a construction step: the instance plus how to dispose it.
///
/// Lifestyle nodes consume the hook (a scope or the container takes
/// ownership of it). Anything else drops it.
#[derive(Clone)]
pub struct Created {
    pub instance: Instance,
    pub dispose: Option<DisposeHook>,
}

impl Created {
    pub fn new(instance: Instance) -> Self {
        Self { instance, dispose: None }
    }

    pub fn with_hook(instance: Instance, dispose: Option<DisposeHook>) -> Self {
        Self { instance, dispose }
    }
}

impl fmt::Debug for Created {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Created")
            .field("instance", &self.instance)
            .field("disposable", &self.dispose.is_some())
            .finish()
    }
}
