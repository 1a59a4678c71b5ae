//! Registrations: how one implementation is materialized under one lifestyle.
//!
//! A [`Registration`] owns its source (constructor, factory or existing
//! instance), its lifestyle and the singleton cell shared by every producer
//! that points at it. Its construction plan is built lazily, once, and the
//! dependency edges discovered on the way are kept for diagnostics.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::trace;

use crate::collection::CollectionSource;
use crate::container::Container;
use crate::cycle::CycleGuard;
use crate::diagnostics::DiagnosticKind;
use crate::error::Result;
use crate::injectable::{CollectionWrap, Constructor, Dependency};
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::lifestyle::Lifestyle;
use crate::plan::{FactoryFn, Plan, SingletonCell};
use crate::relationship::KnownRelationship;

/// Process-wide unique registration identity.
///
/// Scopes cache instances under this id, so two registrations of the same
/// implementation never share a scoped instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RegistrationId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where instances of a registration come from.
pub(crate) enum Source {
    Constructor(Constructor),
    Factory(FactoryFn),
    Instance(Instance),
    Collection(Arc<CollectionSource>, CollectionWrap),
}

struct Built {
    plan: Plan,
    relationships: Vec<KnownRelationship>,
}

/// Describes how to produce one implementation under one lifestyle.
///
/// Registrations are shared: several producers (service keys) may point at
/// the same one, and then they share its singleton instance.
pub struct Registration {
    id: RegistrationId,
    container_id: u64,
    implementation: TypeKey,
    lifestyle: Lifestyle,
    source: Source,
    singleton: Arc<SingletonCell>,
    built: OnceCell<Built>,
    building: CycleGuard,
    suppressions: Mutex<Vec<(DiagnosticKind, String)>>,
}

impl Registration {
    pub(crate) fn new(
        implementation: TypeKey,
        lifestyle: Lifestyle,
        source: Source,
        container: &Container,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: RegistrationId::next(),
            container_id: container.id(),
            implementation,
            lifestyle,
            source,
            singleton: Arc::new(OnceCell::new()),
            built: OnceCell::new(),
            building: CycleGuard::new(),
            suppressions: Mutex::new(Vec::new()),
        })
    }

    /// Registration that hands out one existing instance.
    pub(crate) fn for_instance(instance: Instance, implementation: TypeKey, container: &Container) -> Arc<Self> {
        Self::new(implementation, Lifestyle::Singleton, Source::Instance(instance), container)
    }

    /// Registration of the container-controlled collection of `source`.
    pub(crate) fn for_collection(source: Arc<CollectionSource>, wrap: CollectionWrap, container: &Container) -> Arc<Self> {
        let service = source.service();
        Self::new(service, Lifestyle::Singleton, Source::Collection(source, wrap), container)
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// The type being built. Factories report the service type.
    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    pub(crate) fn container_id(&self) -> u64 {
        self.container_id
    }

    pub(crate) fn singleton_cell(&self) -> &Arc<SingletonCell> {
        &self.singleton
    }

    /// Returns `true` if instances own resources the container must release.
    pub fn is_disposable(&self) -> bool {
        matches!(&self.source, Source::Constructor(ctor) if ctor.is_disposable())
    }

    /// Constructor parameters, empty for factories and instances.
    pub fn dependencies(&self) -> Vec<Dependency> {
        match &self.source {
            Source::Constructor(ctor) => ctor.dependencies(),
            _ => Vec::new(),
        }
    }

    /// Builds, or returns the cached, construction plan.
    ///
    /// The constructor is walked at most once, even under concurrent first
    /// use. A failed build caches nothing.
    pub fn build_plan(&self, container: &Container) -> Result<Plan> {
        if let Some(built) = self.built.get() {
            return Ok(built.plan.clone());
        }

        let _building = container.plan_lock();
        // Reached again on this thread through another service key sharing
        // this registration.
        let _entered = self.building.enter(self.implementation)?;
        let built = self.built.get_or_try_init(|| -> Result<Built> {
            let (plan, relationships) = self.build_uncached(container)?;
            trace!(
                implementation = %self.implementation,
                lifestyle = %self.lifestyle,
                plan = plan.kind(),
                "Built registration plan"
            );
            Ok(Built { plan, relationships })
        })?;
        Ok(built.plan.clone())
    }

    /// Stores a plan built elsewhere, by the decorator pipeline.
    /// Returns whichever plan ends up cached.
    pub(crate) fn seal(&self, plan: Plan, relationships: Vec<KnownRelationship>) -> Plan {
        self.built.get_or_init(|| Built { plan, relationships }).plan.clone()
    }

    fn build_uncached(&self, container: &Container) -> Result<(Plan, Vec<KnownRelationship>)> {
        match &self.source {
            Source::Constructor(ctor) => {
                let dependencies = ctor.dependencies();
                let mut arguments = Vec::with_capacity(dependencies.len());
                let mut relationships = Vec::with_capacity(dependencies.len());

                for dependency in &dependencies {
                    let (plan, producer) = container.plan_for_dependency(dependency, self.implementation)?;
                    relationships.push(KnownRelationship::new(
                        self.implementation,
                        self.lifestyle.clone(),
                        producer,
                        dependency.kind(),
                    ));
                    arguments.push(plan);
                }

                let inner = Plan::New {
                    implementation: self.implementation,
                    arguments,
                    construct: ctor.construct.clone(),
                };
                Ok((self.lifestyle.apply(inner, self, container), relationships))
            }
            Source::Factory(factory) => {
                let inner = Plan::Invoke {
                    service: self.implementation,
                    factory: factory.clone(),
                };
                Ok((self.lifestyle.apply(inner, self, container), Vec::new()))
            }
            Source::Instance(instance) => Ok((Plan::Constant(instance.clone()), Vec::new())),
            Source::Collection(source, wrap) => Ok((
                Plan::Collection {
                    service: source.service(),
                    source: source.clone(),
                    wrap: *wrap,
                },
                Vec::new(),
            )),
        }
    }

    /// Edges recorded by the first successful plan build.
    pub fn relationships(&self) -> Vec<KnownRelationship> {
        self.built
            .get()
            .map(|built| built.relationships.clone())
            .unwrap_or_default()
    }

    /// Turns off one diagnostic rule for this registration.
    pub fn suppress_diagnostic_warning(&self, kind: DiagnosticKind, justification: impl Into<String>) {
        self.suppressions.lock().push((kind, justification.into()));
    }

    /// Returns `true` if `kind` was suppressed for this registration.
    pub fn is_suppressed(&self, kind: DiagnosticKind) -> bool {
        self.suppressions.lock().iter().any(|(k, _)| *k == kind)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("implementation", &self.implementation)
            .field("lifestyle", &self.lifestyle)
            .field("built", &self.built.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injectable::{Arguments, Injectable};
    use std::sync::atomic::AtomicUsize;

    static WALKS: AtomicUsize = AtomicUsize::new(0);

    struct Clock;

    impl Injectable for Clock {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Clock)
        }
    }

    struct Audited {
        _clock: Arc<Clock>,
    }

    impl Injectable for Audited {
        fn dependencies() -> Vec<Dependency> {
            WALKS.fetch_add(1, Ordering::SeqCst);
            vec![Dependency::concrete::<Clock>()]
        }

        fn construct(args: &mut Arguments) -> Result<Self> {
            Ok(Audited { _clock: args.get()? })
        }
    }

    static SHARED_WALKS: AtomicUsize = AtomicUsize::new(0);

    struct Shared;

    impl Injectable for Shared {
        fn dependencies() -> Vec<Dependency> {
            SHARED_WALKS.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Vec::new()
        }

        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Shared)
        }
    }

    struct UsesA {
        _shared: Arc<Shared>,
    }

    impl Injectable for UsesA {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<Shared>()]
        }

        fn construct(args: &mut Arguments) -> Result<Self> {
            Ok(UsesA { _shared: args.get()? })
        }
    }

    struct UsesB {
        _shared: Arc<Shared>,
    }

    impl Injectable for UsesB {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<Shared>()]
        }

        fn construct(args: &mut Arguments) -> Result<Self> {
            Ok(UsesB { _shared: args.get()? })
        }
    }

    #[test]
    fn ids_are_unique() {
        let a = RegistrationId::next();
        let b = RegistrationId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn plan_is_built_once() {
        let container = Container::new();
        let registration = Lifestyle::Transient.create_registration::<Audited, Audited>(&container);
        let before = WALKS.load(Ordering::SeqCst);

        let first = registration.build_plan(&container).unwrap();
        let second = registration.build_plan(&container).unwrap();

        assert_eq!(WALKS.load(Ordering::SeqCst) - before, 1);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
        assert_eq!(registration.relationships().len(), 1);
    }

    #[test]
    fn shared_dependency_plan_is_built_once_across_threads() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..20 {
            let container = Container::new();
            container.register::<Shared, Shared>(Lifestyle::Transient).unwrap();
            container.register::<UsesA, UsesA>(Lifestyle::Transient).unwrap();
            container.register::<UsesB, UsesB>(Lifestyle::Transient).unwrap();
            let before = SHARED_WALKS.load(Ordering::SeqCst);

            let barrier = Arc::new(Barrier::new(2));
            let a = {
                let container = container.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    container.get_instance::<UsesA>().map(|_| ())
                })
            };
            let b = {
                let container = container.clone();
                thread::spawn(move || {
                    barrier.wait();
                    container.get_instance::<UsesB>().map(|_| ())
                })
            };
            a.join().unwrap().unwrap();
            b.join().unwrap().unwrap();

            assert_eq!(SHARED_WALKS.load(Ordering::SeqCst) - before, 1);
        }
    }

    #[test]
    fn registration_reached_again_through_another_key_is_a_cycle() {
        use crate::error::MawridError;

        trait Feed: Send + Sync {}

        struct Looped;
        impl Feed for Looped {}
        impl Injectable for Looped {
            fn dependencies() -> Vec<Dependency> {
                vec![Dependency::on::<Box<dyn Feed>>()]
            }
            fn construct(_: &mut Arguments) -> Result<Self> {
                Ok(Looped)
            }
        }
        crate::implements!(Looped => dyn Feed);

        let container = Container::new();
        let registration = Lifestyle::Transient.create_registration::<dyn Feed, Looped>(&container);
        container
            .register_registration(TypeKey::of::<dyn Feed>(), registration.clone())
            .unwrap();
        container
            .register_registration(TypeKey::of::<Box<dyn Feed>>(), registration)
            .unwrap();

        match container.get_instance::<dyn Feed>() {
            Err(MawridError::CyclicDependency(e)) => assert_eq!(
                e.path,
                vec![
                    TypeKey::of::<dyn Feed>(),
                    TypeKey::of::<Box<dyn Feed>>(),
                    TypeKey::of::<Looped>(),
                ]
            ),
            other => panic!("Expected CyclicDependency, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn singleton_plan_wraps_construction() {
        let container = Container::new();
        let registration = Lifestyle::Singleton.create_registration::<Clock, Clock>(&container);
        let plan = registration.build_plan(&container).unwrap();
        assert_eq!(plan.kind(), "singleton");
    }

    #[test]
    fn suppressions_are_per_kind() {
        let container = Container::new();
        let registration = Lifestyle::Transient.create_registration::<Clock, Clock>(&container);
        registration.suppress_diagnostic_warning(DiagnosticKind::DisposableTransientComponent, "owned by host");

        assert!(registration.is_suppressed(DiagnosticKind::DisposableTransientComponent));
        assert!(!registration.is_suppressed(DiagnosticKind::LifestyleMismatch));
    }
}
