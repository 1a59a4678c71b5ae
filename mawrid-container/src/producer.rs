//! Instance producers: one service key bound to one registration.
//!
//! The producer is what the container hands out instances from. It owns the
//! decorated plan and the compiled delegate, both built at most once, and
//! guards against cyclic graphs until its first successful resolution.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::trace;

use crate::collection::CollectionSource;
use crate::container::Container;
use crate::cycle::CycleGuard;
use crate::decorator::{Decoration, DecoratorLayer};
use crate::error::{ActivationError, MawridError, Result};
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::lifestyle::Lifestyle;
use crate::options::PlanExecution;
use crate::plan::{InstanceCreator, Plan};
use crate::registration::Registration;
use crate::relationship::KnownRelationship;

/// How a producer came to exist.
#[derive(Clone)]
pub(crate) enum Origin {
    /// Registered by the user under its service key.
    Explicit,
    /// Created by unregistered-type resolution.
    Implicit,
    /// One element of a collection.
    Element,
    /// The container-controlled collection itself.
    Collection(Arc<CollectionSource>),
    /// The wrapped service inside a decorator layer.
    Decoratee,
}

struct Decorated {
    plan: Plan,
    decorators: Vec<KnownRelationship>,
    outermost: Option<DecoratorLayer>,
}

/// Produces instances of one service from one [`Registration`].
pub struct InstanceProducer {
    service: TypeKey,
    registration: Arc<Registration>,
    origin: Origin,
    guard: CycleGuard,
    plan: OnceCell<Decorated>,
    compiled: OnceCell<InstanceCreator>,
}

impl InstanceProducer {
    pub(crate) fn new(service: TypeKey, registration: Arc<Registration>, origin: Origin) -> Arc<Self> {
        Arc::new(Self {
            service,
            registration,
            origin,
            guard: CycleGuard::new(),
            plan: OnceCell::new(),
            compiled: OnceCell::new(),
        })
    }

    /// Producer whose plan is fixed up front and never decorated.
    ///
    /// `outermost` is the decorator layer `plan` already ends in, if any.
    pub(crate) fn with_plan(
        service: TypeKey,
        registration: Arc<Registration>,
        origin: Origin,
        plan: Plan,
        outermost: Option<DecoratorLayer>,
    ) -> Arc<Self> {
        let producer = Self::new(service, registration, origin);
        let _ = producer.plan.set(Decorated {
            plan,
            decorators: Vec::new(),
            outermost,
        });
        producer
    }

    /// Producer that always hands out `value`.
    #[cfg(test)]
    pub(crate) fn for_instance<S: ?Sized + Send + Sync + 'static>(
        container: &Container,
        value: Arc<S>,
    ) -> Arc<Self> {
        let service = TypeKey::of::<S>();
        let registration = Registration::for_instance(Instance::new(value), service, container);
        Self::new(service, registration, Origin::Explicit)
    }

    /// The service key this producer answers for.
    pub fn service(&self) -> TypeKey {
        self.service
    }

    pub fn registration(&self) -> &Arc<Registration> {
        &self.registration
    }

    pub fn implementation(&self) -> TypeKey {
        self.registration.implementation()
    }

    pub fn lifestyle(&self) -> &Lifestyle {
        self.registration.lifestyle()
    }

    /// Lifestyle of what consumers actually receive.
    ///
    /// That is the outermost decorator layer's lifestyle once the plan is
    /// built, the registration's otherwise.
    pub fn effective_lifestyle(&self) -> &Lifestyle {
        match self.outermost() {
            Some(layer) => &layer.lifestyle,
            None => self.lifestyle(),
        }
    }

    /// Type of what consumers actually receive; see [`Self::effective_lifestyle`].
    pub fn effective_implementation(&self) -> TypeKey {
        match self.outermost() {
            Some(layer) => layer.implementation,
            None => self.implementation(),
        }
    }

    fn outermost(&self) -> Option<&DecoratorLayer> {
        self.plan.get().and_then(|decorated| decorated.outermost.as_ref())
    }

    /// Returns `true` if the container created this producer on its own.
    pub fn is_implicit(&self) -> bool {
        matches!(self.origin, Origin::Implicit)
    }

    /// Returns `true` for the producer of a container-controlled collection.
    pub fn is_collection(&self) -> bool {
        matches!(self.origin, Origin::Collection(_))
    }

    pub(crate) fn is_decoratee(&self) -> bool {
        matches!(self.origin, Origin::Decoratee)
    }

    /// Element producers, for a collection producer.
    pub fn collection_elements(&self) -> Vec<Arc<InstanceProducer>> {
        match &self.origin {
            Origin::Collection(source) => source.producers(),
            _ => Vec::new(),
        }
    }

    /// Registration edges plus one edge per decorator layer.
    pub fn relationships(&self) -> Vec<KnownRelationship> {
        let mut relationships = self.registration.relationships();
        if let Some(decorated) = self.plan.get() {
            relationships.extend(decorated.decorators.iter().cloned());
        }
        relationships
    }

    /// Returns `true` once the producer has resolved successfully.
    pub fn is_valid(&self) -> bool {
        self.guard.is_valid()
    }

    /// Builds, or returns the cached, decorated plan.
    pub fn build_plan(&self, container: &Container) -> Result<Plan> {
        if let Some(decorated) = self.plan.get() {
            return Ok(decorated.plan.clone());
        }

        let _entered = self.guard.enter(self.service)?;
        self.decorated_plan(container).map_err(|e| self.frame(e))
    }

    /// Produces one instance according to the registration's lifestyle.
    pub fn get_instance(&self, container: &Container) -> Result<Instance> {
        let entered = self.guard.enter(self.service)?;
        let result = self.produce(container).map_err(|e| self.frame(e));
        drop(entered);

        let instance = result?;
        self.guard.mark_valid();
        trace!(service = %self.service, implementation = %self.implementation(), "Resolved");
        Ok(instance)
    }

    /// Compiles the delegate without running it.
    pub(crate) fn compile(&self, container: &Container) -> Result<()> {
        let _entered = self.guard.enter(self.service)?;
        if container.options().plan_execution == PlanExecution::Compiled {
            self.creator(container).map_err(|e| self.frame(e))?;
        } else {
            self.decorated_plan(container).map_err(|e| self.frame(e))?;
        }
        Ok(())
    }

    fn produce(&self, container: &Container) -> Result<Instance> {
        match container.options().plan_execution {
            PlanExecution::Compiled => {
                let creator = self.creator(container)?;
                Ok(creator(container)?.instance)
            }
            PlanExecution::Interpreted => Ok(self.decorated_plan(container)?.execute(container)?.instance),
        }
    }

    fn creator(&self, container: &Container) -> Result<&InstanceCreator> {
        if let Some(creator) = self.compiled.get() {
            return Ok(creator);
        }

        // Plan lock first, then the cell, in every thread.
        let _building = container.plan_lock();
        self.compiled
            .get_or_try_init(|| self.decorated_plan(container).map(|plan| plan.compile()))
    }

    fn decorated_plan(&self, container: &Container) -> Result<Plan> {
        if let Some(decorated) = self.plan.get() {
            return Ok(decorated.plan.clone());
        }

        let _building = container.plan_lock();
        let decorated = self.plan.get_or_try_init(|| -> Result<Decorated> {
            let plan = self.registration.build_plan(container)?;
            let Decoration {
                plan,
                relationships: decorators,
                outermost,
            } = container.decorate(self, plan)?;
            Ok(Decorated {
                plan: container.intercept(self, plan),
                decorators,
                outermost,
            })
        })?;
        Ok(decorated.plan.clone())
    }

    /// Adds this producer to the resolution path of a failure.
    fn frame(&self, error: MawridError) -> MawridError {
        match error {
            MawridError::CyclicDependency(mut e) => {
                e.path.insert(0, self.service);
                MawridError::CyclicDependency(e)
            }
            MawridError::Activation(mut e) => {
                if e.path.first() != Some(&self.service) {
                    e.path.insert(0, self.service);
                }
                MawridError::Activation(e)
            }
            e @ (MawridError::ConstructionFailed { .. } | MawridError::TypeMismatch { .. }) => {
                MawridError::Activation(ActivationError::new(
                    self.service,
                    format!(
                        "Creating an instance of {} failed. {e}",
                        self.service.short_name()
                    ),
                ))
            }
            other => other,
        }
    }
}

impl fmt::Debug for InstanceProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProducer")
            .field("service", &self.service)
            .field("implementation", &self.implementation())
            .field("lifestyle", self.lifestyle())
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injectable::{Arguments, Injectable};

    struct Clock;

    impl Injectable for Clock {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Clock)
        }
    }

    struct Broken;

    impl Injectable for Broken {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Err(MawridError::construction::<Broken>("socket closed"))
        }
    }

    fn producer_for<T: Injectable>(container: &Container, lifestyle: Lifestyle) -> Arc<InstanceProducer> {
        let registration = lifestyle.create_registration::<T, T>(container);
        InstanceProducer::new(TypeKey::of::<T>(), registration, Origin::Explicit)
    }

    #[test]
    fn becomes_valid_after_first_success() {
        let container = Container::new();
        let producer = producer_for::<Clock>(&container, Lifestyle::Transient);

        assert!(!producer.is_valid());
        producer.get_instance(&container).unwrap();
        assert!(producer.is_valid());
    }

    #[test]
    fn singleton_producer_shares_instance() {
        let container = Container::new();
        let producer = producer_for::<Clock>(&container, Lifestyle::Singleton);

        let a = producer.get_instance(&container).unwrap();
        let b = producer.get_instance(&container).unwrap();
        assert!(a.same(&b));
    }

    #[test]
    fn construction_failure_becomes_activation_error() {
        let container = Container::new();
        let producer = producer_for::<Broken>(&container, Lifestyle::Transient);

        match producer.get_instance(&container) {
            Err(MawridError::Activation(e)) => {
                assert!(e.service.is::<Broken>());
                assert!(e.message.contains("socket closed"));
                assert_eq!(e.path, vec![TypeKey::of::<Broken>()]);
            }
            other => panic!("Expected Activation, got: {other:?}"),
        }
        assert!(!producer.is_valid());
    }

    #[test]
    fn instance_producer_returns_value() {
        let container = Container::new();
        let clock = Arc::new(Clock);
        let producer = InstanceProducer::for_instance(&container, clock.clone());

        let produced = producer.get_instance(&container).unwrap().downcast::<Clock>().unwrap();
        assert!(Arc::ptr_eq(&produced, &clock));
    }
}
