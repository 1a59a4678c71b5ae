//! Open-generic registrations.
//!
//! Rust has no open generic types at runtime, so a "generic" registration is
//! a family of closed instantiations registered as one unit. The container
//! closes the family for a service key when that key is first requested.
//!
//! ```rust
//! use mawrid_container::prelude::*;
//! use std::marker::PhantomData;
//! use std::sync::Arc;
//!
//! trait Handler<C>: Send + Sync {
//!     fn handle(&self, command: C);
//! }
//!
//! struct Logged<C>(PhantomData<fn(C)>);
//! impl<C: 'static> Handler<C> for Logged<C> {
//!     fn handle(&self, _: C) {}
//! }
//! impl<C: 'static> Injectable for Logged<C> {
//!     fn construct(_: &mut Arguments) -> Result<Self> { Ok(Logged(PhantomData)) }
//! }
//! impl<C: 'static> Implements<dyn Handler<C>> for Logged<C> {
//!     fn upcast(self: Arc<Self>) -> Arc<dyn Handler<C>> { self }
//! }
//!
//! let family = GenericFamily::new("Logged")
//!     .with::<dyn Handler<u32>, Logged<u32>>()
//!     .with::<dyn Handler<String>, Logged<String>>();
//! assert_eq!(family.len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::injectable::{Constructor, Implements, Injectable};
use crate::key::TypeKey;

/// A set of closed instantiations of one generic implementation.
#[derive(Clone)]
pub struct GenericFamily {
    name: String,
    members: HashMap<TypeKey, Constructor>,
    order: Vec<TypeKey>,
}

impl GenericFamily {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Adds the instantiation that serves `S` with `I`.
    pub fn with<S, I>(mut self) -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable + Implements<S>,
    {
        let service = TypeKey::of::<S>();
        if self.members.insert(service, Constructor::of::<S, I>()).is_none() {
            self.order.push(service);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Closes the family for `service`, if it has a member for it.
    pub fn close(&self, service: TypeKey) -> Option<&Constructor> {
        self.members.get(&service)
    }

    /// Every service key the family can close, in the order added.
    pub fn services(&self) -> impl Iterator<Item = TypeKey> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Debug for GenericFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericFamily")
            .field("name", &self.name)
            .field("services", &self.order)
            .finish()
    }
}
