//! Lifestyles: how long a produced instance lives.
//!
//! A lifestyle decides whether the container builds a new instance on each
//! request or hands out a cached one:
//! - [`Lifestyle::Transient`]: new instance on every request
//! - [`Lifestyle::Scoped`]: one instance per active scope
//! - [`Lifestyle::Singleton`]: one instance per registration, for the life of the container
//! - [`Lifestyle::hybrid`]: picks one of two lifestyles per request
//! - [`Lifestyle::custom`]: user-defined caching around the transient creator
//!
//! # Length
//! Each lifestyle has a length used only for comparison. A component must
//! not depend on anything shorter-lived than itself:
//! `Transient (1) < Scoped (500) < Singleton (1000)`.

use std::fmt;
use std::sync::Arc;

use crate::container::Container;
use crate::injectable::{Constructor, Implements, Injectable};
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::plan::{FactoryFn, InstanceCreator, LifestyleApplier, Plan, Predicate};
use crate::registration::{Registration, Source};

pub const TRANSIENT_LENGTH: u32 = 1;
pub const SCOPED_LENGTH: u32 = 500;
pub const SINGLETON_LENGTH: u32 = 1000;

/// Caching policy of a registration.
///
/// # Examples
/// ```
/// use mawrid_container::lifestyle::Lifestyle;
///
/// assert!(Lifestyle::Singleton.component_length() > Lifestyle::Scoped.component_length());
/// assert!(Lifestyle::Scoped.component_length() > Lifestyle::Transient.component_length());
/// ```
#[derive(Clone)]
pub enum Lifestyle {
    /// New instance on every request.
    ///
    /// Never cached and never disposed by the container.
    Transient,

    /// One instance per active scope.
    ///
    /// Created on first request inside a scope, disposed when the scope ends.
    /// Requesting it with no active scope is an activation error.
    Scoped,

    /// One instance per registration.
    ///
    /// Created on first request, disposed by [`Container::dispose`].
    Singleton,

    /// Chooses between two lifestyles each time an instance is requested.
    Hybrid(Arc<HybridLifestyle>),

    /// User-supplied caching.
    Custom(Arc<CustomLifestyle>),
}

/// Two lifestyles and the predicate that picks between them.
pub struct HybridLifestyle {
    predicate: Predicate,
    when_true: Lifestyle,
    when_false: Lifestyle,
}

/// A named lifestyle whose caching is provided by an applier closure.
pub struct CustomLifestyle {
    name: Arc<str>,
    length: u32,
    applier: LifestyleApplier,
}

impl Lifestyle {
    /// Lifestyle that asks `predicate` on every request.
    ///
    /// `true` selects `when_true`, `false` selects `when_false`. The answer is
    /// never cached.
    pub fn hybrid(
        predicate: impl Fn() -> bool + Send + Sync + 'static,
        when_true: Lifestyle,
        when_false: Lifestyle,
    ) -> Self {
        Lifestyle::Hybrid(Arc::new(HybridLifestyle {
            predicate: Arc::new(predicate),
            when_true,
            when_false,
        }))
    }

    /// Lifestyle defined by an applier that receives the transient creator
    /// and returns the creator to use instead.
    ///
    /// The applier runs once per registration.
    pub fn custom(
        name: impl Into<Arc<str>>,
        length: u32,
        applier: impl Fn(InstanceCreator) -> InstanceCreator + Send + Sync + 'static,
    ) -> Self {
        Lifestyle::Custom(Arc::new(CustomLifestyle {
            name: name.into(),
            length,
            applier: Arc::new(applier),
        }))
    }

    /// Display name, e.g. `"Hybrid Scoped / Transient"`.
    pub fn name(&self) -> String {
        match self {
            Lifestyle::Transient => "Transient".into(),
            Lifestyle::Scoped => "Scoped".into(),
            Lifestyle::Singleton => "Singleton".into(),
            Lifestyle::Hybrid(h) => format!("Hybrid {} / {}", h.when_true.name(), h.when_false.name()),
            Lifestyle::Custom(c) => c.name.to_string(),
        }
    }

    /// Length used when this lifestyle is the consumer.
    pub fn component_length(&self) -> u32 {
        match self {
            Lifestyle::Transient => TRANSIENT_LENGTH,
            Lifestyle::Scoped => SCOPED_LENGTH,
            Lifestyle::Singleton => SINGLETON_LENGTH,
            Lifestyle::Hybrid(h) => h.when_true.component_length().max(h.when_false.component_length()),
            Lifestyle::Custom(c) => c.length,
        }
    }

    /// Length used when this lifestyle is the dependency.
    pub fn dependency_length(&self) -> u32 {
        match self {
            Lifestyle::Hybrid(h) => h.when_true.dependency_length().min(h.when_false.dependency_length()),
            other => other.component_length(),
        }
    }

    /// Returns `true` if instances are cached at all.
    #[inline]
    pub fn is_cached(&self) -> bool {
        !matches!(self, Lifestyle::Transient)
    }

    /// Registration that builds `I` through its [`Injectable`] constructor
    /// and hands it out as `S`.
    pub fn create_registration<S, I>(&self, container: &Container) -> Arc<Registration>
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable + Implements<S>,
    {
        Registration::new(
            TypeKey::of::<I>(),
            self.clone(),
            Source::Constructor(Constructor::of::<S, I>()),
            container,
        )
    }

    /// Registration that calls `factory` to produce `S`.
    pub fn create_factory_registration<S>(
        &self,
        factory: impl Fn(&Container) -> crate::error::Result<Arc<S>> + Send + Sync + 'static,
        container: &Container,
    ) -> Arc<Registration>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let factory: FactoryFn =
            Arc::new(move |container: &Container| factory(container).map(|value| Some(Instance::new(value))));
        Registration::new(TypeKey::of::<S>(), self.clone(), Source::Factory(factory), container)
    }

    /// Wraps the transient plan of `registration` in this lifestyle's caching.
    pub(crate) fn apply(&self, inner: Plan, registration: &Registration, container: &Container) -> Plan {
        match self {
            Lifestyle::Transient => inner,
            Lifestyle::Singleton => match registration.singleton_cell().get() {
                Some(instance) => Plan::Constant(instance.clone()),
                None => Plan::Singleton {
                    registration: registration.id(),
                    cell: registration.singleton_cell().clone(),
                    inner: Box::new(inner),
                },
            },
            Lifestyle::Scoped => Plan::Scoped {
                registration: registration.id(),
                service: registration.implementation(),
                manager: container.scope_manager().clone(),
                inner: Box::new(inner),
            },
            Lifestyle::Hybrid(h) => Plan::Conditional {
                predicate: h.predicate.clone(),
                when_true: Box::new(h.when_true.apply(inner.clone(), registration, container)),
                when_false: Box::new(h.when_false.apply(inner, registration, container)),
            },
            Lifestyle::Custom(c) => Plan::custom(c.name.clone(), c.applier.clone(), inner),
        }
    }
}

// Hybrid and custom lifestyles are equal only to themselves.
impl PartialEq for Lifestyle {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Lifestyle::Transient, Lifestyle::Transient)
            | (Lifestyle::Scoped, Lifestyle::Scoped)
            | (Lifestyle::Singleton, Lifestyle::Singleton) => true,
            (Lifestyle::Hybrid(a), Lifestyle::Hybrid(b)) => Arc::ptr_eq(a, b),
            (Lifestyle::Custom(a), Lifestyle::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Lifestyle {}

impl fmt::Display for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl fmt::Debug for Lifestyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lifestyle({})", self.name())
    }
}
