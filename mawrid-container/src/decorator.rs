//! Decorators: wrapping resolved services in other implementations of the
//! same service.
//!
//! A decorator for `S` is an [`Injectable`](crate::injectable::Injectable)
//! implementation of `S` that takes exactly one `S` (or a
//! [`ServiceFactory<S>`](crate::injectable::ServiceFactory)) among its
//! dependencies. When a producer for `S` builds its plan, every matching
//! decorator wraps the plan in turn, in registration order. The decorator
//! registered last ends up outermost.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::container::Container;
use crate::error::{MawridError, Result};
use crate::generic::GenericFamily;
use crate::injectable::{Constructor, DependencyKind, Wrap};
use crate::key::TypeKey;
use crate::lifestyle::Lifestyle;
use crate::plan::Plan;
use crate::producer::{InstanceProducer, Origin};
use crate::registration::{Registration, Source};
use crate::relationship::KnownRelationship;

/// What a decorator predicate gets to look at.
#[derive(Debug)]
pub struct DecoratorContext<'a> {
    /// The service being decorated.
    pub service: TypeKey,
    /// The implementation behind the decorated producer.
    pub implementation: TypeKey,
    /// Lifestyle of the decorated producer.
    pub lifestyle: &'a Lifestyle,
    /// Decorators already wrapped around the service, innermost first.
    pub applied_decorators: &'a [TypeKey],
}

/// The outermost decorator wrapped around a producer.
///
/// Consumers of a decorated service capture this layer, so its lifestyle is
/// the one diagnostics compare against.
#[derive(Debug, Clone)]
pub struct DecoratorLayer {
    pub implementation: TypeKey,
    pub lifestyle: Lifestyle,
}

/// Result of running the decorator pipeline over one plan.
pub(crate) struct Decoration {
    pub plan: Plan,
    pub relationships: Vec<KnownRelationship>,
    pub outermost: Option<DecoratorLayer>,
}

impl Decoration {
    pub fn undecorated(plan: Plan) -> Self {
        Self {
            plan,
            relationships: Vec::new(),
            outermost: None,
        }
    }
}

pub(crate) type DecoratorPredicate = Arc<dyn Fn(&DecoratorContext<'_>) -> bool + Send + Sync>;

pub(crate) enum DecoratorSource {
    Fixed { service: TypeKey, constructor: Constructor },
    Generic(Arc<GenericFamily>),
}

/// One `register_decorator*` call.
pub(crate) struct DecoratorRegistration {
    source: DecoratorSource,
    lifestyle: Lifestyle,
    predicate: Option<DecoratorPredicate>,
}

impl DecoratorRegistration {
    pub fn new(source: DecoratorSource, lifestyle: Lifestyle, predicate: Option<DecoratorPredicate>) -> Self {
        Self {
            source,
            lifestyle,
            predicate,
        }
    }

    fn constructor_for(&self, service: TypeKey) -> Option<&Constructor> {
        match &self.source {
            DecoratorSource::Fixed {
                service: decorated,
                constructor,
            } if *decorated == service => Some(constructor),
            DecoratorSource::Fixed { .. } => None,
            DecoratorSource::Generic(family) => family.close(service),
        }
    }
}

impl fmt::Debug for DecoratorRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            DecoratorSource::Fixed { service, constructor } => write!(
                f,
                "Decorator({} for {}, {})",
                constructor.implementation().short_name(),
                service.short_name(),
                self.lifestyle
            ),
            DecoratorSource::Generic(family) => {
                write!(f, "Decorator({}<..>, {})", family.name(), self.lifestyle)
            }
        }
    }
}

/// Checks that `constructor` can decorate `service`.
///
/// It must take exactly one `S` or `ServiceFactory<S>` and refer to `S` in
/// no other way.
pub(crate) fn validate(service: TypeKey, constructor: &Constructor) -> Result<()> {
    let decorator = constructor.implementation();
    let invalid = |reason: String| MawridError::InvalidDecorator {
        service,
        decorator,
        reason,
    };

    let mut decoratees = 0usize;
    for dependency in constructor.dependencies().iter().filter(|d| d.key() == service) {
        match dependency.kind() {
            DependencyKind::Service | DependencyKind::Factory => decoratees += 1,
            DependencyKind::Collection => {
                return Err(invalid(format!(
                    "it depends on a collection of {}, which would include itself",
                    service.short_name()
                )));
            }
        }
    }

    match decoratees {
        1 => Ok(()),
        0 => Err(invalid(format!(
            "it must take a single {0} or ServiceFactory<{0}> argument to wrap",
            service.short_name()
        ))),
        n => Err(invalid(format!(
            "it takes {n} arguments of type {} where exactly one is allowed",
            service.short_name()
        ))),
    }
}

/// Wraps `plan` with every decorator that applies to `producer`.
///
/// Returns the outermost plan, the edges each layer contributes and the
/// outermost layer itself.
pub(crate) fn decorate(
    container: &Container,
    decorators: &[Arc<DecoratorRegistration>],
    producer: &InstanceProducer,
    plan: Plan,
) -> Result<Decoration> {
    let service = producer.service();
    let mut current = plan;
    let mut outermost: Option<DecoratorLayer> = None;
    let mut relationships = Vec::new();
    let mut applied = Vec::new();

    for decorator in decorators {
        let Some(constructor) = decorator.constructor_for(service) else {
            continue;
        };
        if let Some(predicate) = &decorator.predicate {
            let context = DecoratorContext {
                service,
                implementation: producer.implementation(),
                lifestyle: producer.lifestyle(),
                applied_decorators: &applied,
            };
            if !predicate(&context) {
                continue;
            }
        }

        let implementation = constructor.implementation();
        let decoratee = InstanceProducer::with_plan(
            service,
            producer.registration().clone(),
            Origin::Decoratee,
            current.clone(),
            outermost.clone(),
        );
        let layer = Registration::new(
            implementation,
            decorator.lifestyle.clone(),
            Source::Constructor(constructor.clone()),
            container,
        );

        let dependencies = constructor.dependencies();
        let mut arguments = Vec::with_capacity(dependencies.len());
        let mut edges = Vec::with_capacity(dependencies.len());

        for dependency in &dependencies {
            if dependency.key() != service {
                let (plan, dependency_producer) = container.plan_for_dependency(dependency, implementation)?;
                edges.push(KnownRelationship::new(
                    implementation,
                    decorator.lifestyle.clone(),
                    dependency_producer,
                    dependency.kind(),
                ));
                arguments.push(plan);
                continue;
            }

            let argument = match (dependency.kind(), dependency.wrap) {
                (DependencyKind::Service, _) => current.clone(),
                (DependencyKind::Factory, Wrap::Factory(wrap)) => Plan::Deferred {
                    service,
                    producer: decoratee.clone(),
                    wrap,
                },
                _ => {
                    return Err(MawridError::InvalidDecorator {
                        service,
                        decorator: implementation,
                        reason: "unsupported decoratee argument".into(),
                    });
                }
            };
            edges.push(KnownRelationship::new(
                implementation,
                decorator.lifestyle.clone(),
                decoratee.clone(),
                dependency.kind(),
            ));
            arguments.push(argument);
        }

        let inner = Plan::New {
            implementation,
            arguments,
            construct: constructor.construct.clone(),
        };
        let wrapped = decorator.lifestyle.apply(inner, &layer, container);
        current = layer.seal(wrapped, edges.clone());
        relationships.extend(edges);
        applied.push(implementation);
        outermost = Some(DecoratorLayer {
            implementation,
            lifestyle: decorator.lifestyle.clone(),
        });

        trace!(service = %service, decorator = %implementation, "Applied decorator");
    }

    Ok(Decoration {
        plan: current,
        relationships,
        outermost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injectable::{Arguments, Dependency, Injectable};
    use crate::Result;

    trait Store: Send + Sync {}

    struct Cached;
    impl Store for Cached {}
    impl Injectable for Cached {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<dyn Store>()]
        }
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Cached)
        }
    }

    struct Lazy;
    impl Store for Lazy {}
    impl Injectable for Lazy {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::factory::<dyn Store>(), Dependency::on::<String>()]
        }
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Lazy)
        }
    }

    struct Twice;
    impl Store for Twice {}
    impl Injectable for Twice {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<dyn Store>(), Dependency::on::<dyn Store>()]
        }
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Twice)
        }
    }

    struct Fanout;
    impl Store for Fanout {}
    impl Injectable for Fanout {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<dyn Store>(), Dependency::collection::<dyn Store>()]
        }
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Fanout)
        }
    }

    struct Plain;
    impl Store for Plain {}
    impl Injectable for Plain {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Plain)
        }
    }

    crate::implements!(Cached => dyn Store, Lazy => dyn Store, Twice => dyn Store, Fanout => dyn Store, Plain => dyn Store);

    fn check<D: Injectable + crate::injectable::Implements<dyn Store>>() -> Result<()> {
        validate(TypeKey::of::<dyn Store>(), &Constructor::of::<dyn Store, D>())
    }

    #[test]
    fn accepts_service_or_factory_decoratee() {
        assert!(check::<Cached>().is_ok());
        assert!(check::<Lazy>().is_ok());
    }

    #[test]
    fn rejects_wrong_shapes() {
        for result in [check::<Twice>(), check::<Fanout>(), check::<Plain>()] {
            match result {
                Err(MawridError::InvalidDecorator { service, .. }) => assert!(service.is::<dyn Store>()),
                other => panic!("Expected InvalidDecorator, got: {other:?}"),
            }
        }
    }
}
