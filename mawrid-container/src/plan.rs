//! Construction plans.
//!
//! A [`Plan`] is a tree describing how to produce one instance: call this
//! constructor with these sub-plans as arguments, cache the result in that
//! scope, pick a branch at call time, and so on. Registrations build plans,
//! the decorator pipeline rewrites them, and producers either interpret them
//! directly or compile them once into a closure ([`InstanceCreator`]).

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::collection::CollectionSource;
use crate::container::Container;
use crate::error::{MawridError, Result};
use crate::injectable::{Arguments, CollectionWrap, ConstructFn, FactoryWrap};
use crate::instance::{Created, Instance};
use crate::key::TypeKey;
use crate::producer::InstanceProducer;
use crate::registration::RegistrationId;
use crate::scope_manager::ScopeManager;

/// Compiled form of a plan.
pub type InstanceCreator = Arc<dyn Fn(&Container) -> Result<Created> + Send + Sync>;

/// User factory; `None` means the factory produced nothing.
pub type FactoryFn = Arc<dyn Fn(&Container) -> Result<Option<Instance>> + Send + Sync>;

/// Hybrid lifestyle selector, evaluated on every resolution.
pub type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Custom lifestyle: turns the transient creator into a caching one.
pub type LifestyleApplier = Arc<dyn Fn(InstanceCreator) -> InstanceCreator + Send + Sync>;

/// Exactly-once storage for a singleton instance.
pub(crate) type SingletonCell = OnceCell<Instance>;

/// How an instance gets produced.
#[derive(Clone)]
pub enum Plan {
    /// An instance that already exists.
    Constant(Instance),

    /// Invoke `construct` with the results of `arguments`.
    New {
        implementation: TypeKey,
        arguments: Vec<Plan>,
        construct: ConstructFn,
    },

    /// Call a user factory.
    Invoke { service: TypeKey, factory: FactoryFn },

    /// Hand out a factory that resolves `producer` on demand.
    Deferred {
        service: TypeKey,
        producer: Arc<InstanceProducer>,
        wrap: FactoryWrap,
    },

    /// Hand out a lazy view over a container-controlled collection.
    Collection {
        service: TypeKey,
        source: Arc<CollectionSource>,
        wrap: CollectionWrap,
    },

    /// Run `inner` once and share the result.
    Singleton {
        registration: RegistrationId,
        cell: Arc<SingletonCell>,
        inner: Box<Plan>,
    },

    /// Run `inner` once per active scope.
    Scoped {
        registration: RegistrationId,
        service: TypeKey,
        manager: ScopeManager,
        inner: Box<Plan>,
    },

    /// Choose a branch per call.
    Conditional {
        predicate: Predicate,
        when_true: Box<Plan>,
        when_false: Box<Plan>,
    },

    /// Let a custom lifestyle wrap the compiled `inner`.
    Custom {
        name: Arc<str>,
        applier: LifestyleApplier,
        inner: Box<Plan>,
        applied: Arc<OnceCell<InstanceCreator>>,
    },
}

impl Plan {
    pub(crate) fn custom(name: Arc<str>, applier: LifestyleApplier, inner: Plan) -> Plan {
        Plan::Custom {
            name,
            applier,
            inner: Box::new(inner),
            applied: Arc::new(OnceCell::new()),
        }
    }

    /// Produces an instance by walking the tree.
    pub fn execute(&self, container: &Container) -> Result<Created> {
        match self {
            Plan::Constant(instance) => Ok(Created::new(instance.clone())),
            Plan::New {
                implementation,
                arguments,
                construct,
            } => {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(argument.execute(container)?.instance);
                }
                construct(&mut Arguments::new(*implementation, values))
            }
            Plan::Invoke { service, factory } => invoke(*service, factory, container),
            Plan::Deferred { producer, wrap, .. } => Ok(Created::new(wrap(
                deferred_creator(producer),
                container.downgrade(),
            ))),
            Plan::Collection { source, wrap, .. } => {
                Ok(Created::new(wrap(source.clone(), container.downgrade())))
            }
            Plan::Singleton { cell, inner, .. } => {
                singleton(cell, container, |c| inner.execute(c))
            }
            Plan::Scoped {
                registration,
                service,
                manager,
                inner,
            } => scoped(*registration, *service, manager, container, |c| {
                inner.execute(c)
            }),
            Plan::Conditional {
                predicate,
                when_true,
                when_false,
            } => {
                if predicate() {
                    when_true.execute(container)
                } else {
                    when_false.execute(container)
                }
            }
            Plan::Custom {
                applier,
                inner,
                applied,
                ..
            } => {
                let creator = applied.get_or_init(|| applier(inner.compile()));
                creator(container)
            }
        }
    }

    /// Turns the tree into a single closure.
    pub fn compile(&self) -> InstanceCreator {
        match self {
            Plan::Constant(instance) => {
                let instance = instance.clone();
                Arc::new(move |_: &Container| Ok(Created::new(instance.clone())))
            }
            Plan::New {
                implementation,
                arguments,
                construct,
            } => {
                let implementation = *implementation;
                let arguments: Vec<InstanceCreator> = arguments.iter().map(Plan::compile).collect();
                let construct = construct.clone();
                Arc::new(move |container: &Container| {
                    let mut values = Vec::with_capacity(arguments.len());
                    for argument in &arguments {
                        values.push(argument(container)?.instance);
                    }
                    construct(&mut Arguments::new(implementation, values))
                })
            }
            Plan::Invoke { service, factory } => {
                let service = *service;
                let factory = factory.clone();
                Arc::new(move |container: &Container| invoke(service, &factory, container))
            }
            Plan::Deferred { producer, wrap, .. } => {
                let creator = deferred_creator(producer);
                let wrap = *wrap;
                Arc::new(move |container: &Container| {
                    Ok(Created::new(wrap(creator.clone(), container.downgrade())))
                })
            }
            Plan::Collection { source, wrap, .. } => {
                let source = source.clone();
                let wrap = *wrap;
                Arc::new(move |container: &Container| {
                    Ok(Created::new(wrap(source.clone(), container.downgrade())))
                })
            }
            Plan::Singleton { cell, inner, .. } => {
                let cell = cell.clone();
                let inner = inner.compile();
                Arc::new(move |container: &Container| {
                    singleton(&cell, container, |c| inner(c))
                })
            }
            Plan::Scoped {
                registration,
                service,
                manager,
                inner,
            } => {
                let registration = *registration;
                let service = *service;
                let manager = manager.clone();
                let inner = inner.compile();
                Arc::new(move |container: &Container| {
                    scoped(registration, service, &manager, container, |c| inner(c))
                })
            }
            Plan::Conditional {
                predicate,
                when_true,
                when_false,
            } => {
                let predicate = predicate.clone();
                let when_true = when_true.compile();
                let when_false = when_false.compile();
                Arc::new(move |container: &Container| {
                    if predicate() {
                        when_true(container)
                    } else {
                        when_false(container)
                    }
                })
            }
            Plan::Custom {
                applier,
                inner,
                applied,
                ..
            } => applied.get_or_init(|| applier(inner.compile())).clone(),
        }
    }

    /// Short label of the root node, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Plan::Constant(_) => "constant",
            Plan::New { .. } => "new",
            Plan::Invoke { .. } => "invoke",
            Plan::Deferred { .. } => "deferred",
            Plan::Collection { .. } => "collection",
            Plan::Singleton { .. } => "singleton",
            Plan::Scoped { .. } => "scoped",
            Plan::Conditional { .. } => "conditional",
            Plan::Custom { .. } => "custom",
        }
    }
}

fn deferred_creator(producer: &Arc<InstanceProducer>) -> InstanceCreator {
    let producer = producer.clone();
    Arc::new(move |container: &Container| producer.get_instance(container).map(Created::new))
}

fn invoke(service: TypeKey, factory: &FactoryFn, container: &Container) -> Result<Created> {
    match factory(container)? {
        Some(instance) => Ok(Created::new(instance)),
        None => Err(MawridError::activation(
            service,
            format!(
                "The registered factory for type {} returned nothing",
                service.short_name()
            ),
        )),
    }
}

fn singleton(
    cell: &SingletonCell,
    container: &Container,
    create: impl FnOnce(&Container) -> Result<Created>,
) -> Result<Created> {
    let instance = cell.get_or_try_init(|| {
        let created = create(container)?;
        if let Some(hook) = created.dispose {
            container.track_singleton_disposal(&created.instance, hook);
        }
        Ok::<_, MawridError>(created.instance)
    })?;
    Ok(Created::new(instance.clone()))
}

fn scoped(
    registration: RegistrationId,
    service: TypeKey,
    manager: &ScopeManager,
    container: &Container,
    create: impl FnOnce(&Container) -> Result<Created>,
) -> Result<Created> {
    let scope = manager.current().ok_or_else(|| {
        MawridError::activation(
            service,
            format!(
                "{} is registered as Scoped, but the instance is requested outside the context of an active scope. \
                 Call begin_scope() first",
                service.short_name()
            ),
        )
    })?;
    let instance = scope.get_or_create(registration, service, || create(container))?;
    Ok(Created::new(instance))
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Constant(instance) => write!(f, "Constant({})", instance.type_name()),
            Plan::New {
                implementation,
                arguments,
                ..
            } => {
                write!(f, "New({}", implementation.short_name())?;
                for argument in arguments {
                    write!(f, ", {argument:?}")?;
                }
                f.write_str(")")
            }
            Plan::Invoke { service, .. } => write!(f, "Invoke({})", service.short_name()),
            Plan::Deferred { service, .. } => write!(f, "Deferred({})", service.short_name()),
            Plan::Collection { service, .. } => write!(f, "Collection({})", service.short_name()),
            Plan::Singleton { inner, .. } => write!(f, "Singleton({inner:?})"),
            Plan::Scoped { inner, .. } => write!(f, "Scoped({inner:?})"),
            Plan::Conditional {
                when_true,
                when_false,
                ..
            } => write!(f, "Conditional({when_true:?} | {when_false:?})"),
            Plan::Custom { name, inner, .. } => write!(f, "Custom[{name}]({inner:?})"),
        }
    }
}
