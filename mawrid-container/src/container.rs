//! # The Container
//!
//! Maps service keys to [`InstanceProducer`]s and resolves them.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──register*()──> producers
//!                                  │
//!                  get_instance() / verify()  (locks the container)
//!                                  │
//!                                  ▼
//!                  producer ─> plan ─> compiled creator ─> Instance
//! ```
//!
//! Registration goes through `&self`. The first call to `get_instance`,
//! `get_all_instances` or `verify` locks the container. After that, only the
//! container itself adds producers (unregistered concrete types, closed
//! generics, handler-supplied registrations).
//!
//! # Examples
//! ```rust
//! use mawrid_container::prelude::*;
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) { println!("{msg}"); }
//! }
//! impl Injectable for ConsoleLogger {
//!     fn construct(_: &mut Arguments) -> Result<Self> { Ok(ConsoleLogger) }
//! }
//! mawrid_container::implements!(ConsoleLogger => dyn Logger);
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//! impl Injectable for UserService {
//!     fn dependencies() -> Vec<Dependency> { vec![Dependency::on::<dyn Logger>()] }
//!     fn construct(args: &mut Arguments) -> Result<Self> {
//!         Ok(UserService { logger: args.get()? })
//!     }
//! }
//!
//! let container = Container::new();
//! container.register::<dyn Logger, ConsoleLogger>(Lifestyle::Singleton).unwrap();
//! container.register::<UserService, UserService>(Lifestyle::Transient).unwrap();
//!
//! let service = container.get_instance::<UserService>().unwrap();
//! service.logger.log("ready");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use mawrid_support::rendering::closest_matches;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::{debug, info, instrument, trace};

use crate::collection::{Collection, CollectionSource, Instances};
use crate::decorator::{self, Decoration, DecoratorContext, DecoratorRegistration, DecoratorSource};
use crate::diagnostics::graph::ProducerGraph;
use crate::diagnostics::{Analyzer, DiagnosticKind, DiagnosticReport};
use crate::error::{AlreadyRegisteredError, MawridError, NotRegisteredError, Result};
use crate::generic::GenericFamily;
use crate::injectable::{
    CollectionWrap, Constructor, Dependency, ImplicitRegistration, Implements, Injectable, Wrap,
};
use crate::instance::{DisposeHook, Instance};
use crate::key::TypeKey;
use crate::lifestyle::Lifestyle;
use crate::options::{ContainerOptions, PlanExecution};
use crate::plan::{FactoryFn, Plan};
use crate::producer::{InstanceProducer, Origin};
use crate::registration::{Registration, Source};
use crate::scope::{Scope, ScopeGuard};
use crate::scope_manager::ScopeManager;

/// Supplies a registration for a key nobody registered.
pub type UnregisteredTypeHandler = Arc<dyn Fn(TypeKey, &Container) -> Option<Arc<Registration>> + Send + Sync>;

/// Inspects or replaces a producer's plan before it is cached.
pub type ExpressionBuiltHandler = Arc<dyn Fn(&mut ExpressionBuilt) + Send + Sync>;

/// Passed to [`Container::on_expression_built`] handlers.
pub struct ExpressionBuilt {
    pub service: TypeKey,
    pub registration: Arc<Registration>,
    /// The decorated plan. Handlers may replace it.
    pub plan: Plan,
}

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`] with non-default [`ContainerOptions`].
///
/// # Examples
/// ```rust
/// use mawrid_container::prelude::*;
///
/// let container = Container::builder()
///     .allow_overriding_registrations(true)
///     .plan_execution(PlanExecution::Interpreted)
///     .build();
/// assert!(container.options().allow_overriding_registrations);
/// ```
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    options: ContainerOptions,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Lets a later registration replace an earlier one for the same key.
    pub fn allow_overriding_registrations(mut self, allow: bool) -> Self {
        self.options.allow_overriding_registrations = allow;
        self
    }

    /// Builds unregistered concrete dependencies as Transient.
    pub fn resolve_unregistered_concrete_types(mut self, resolve: bool) -> Self {
        self.options.resolve_unregistered_concrete_types = resolve;
        self
    }

    pub fn plan_execution(mut self, execution: PlanExecution) -> Self {
        self.options.plan_execution = execution;
        self
    }

    /// Lifestyle used by [`Container::register_default`].
    pub fn default_lifestyle(mut self, lifestyle: Lifestyle) -> Self {
        self.options.default_lifestyle = lifestyle;
        self
    }

    pub fn build(self) -> Container {
        Container::with_options(self.options)
    }
}

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

struct ContainerInner {
    id: u64,
    options: ContainerOptions,
    scope_manager: ScopeManager,
    explicit: DashMap<TypeKey, Arc<InstanceProducer>>,
    order: Mutex<Vec<TypeKey>>,
    resolved: DashMap<TypeKey, Arc<InstanceProducer>>,
    collections: DashMap<TypeKey, Arc<CollectionSource>>,
    collection_producers: DashMap<TypeKey, Arc<InstanceProducer>>,
    generics: RwLock<Vec<(Arc<GenericFamily>, Lifestyle)>>,
    decorators: RwLock<Vec<Arc<DecoratorRegistration>>>,
    unregistered_handlers: RwLock<Vec<UnregisteredTypeHandler>>,
    expression_built: RwLock<Vec<ExpressionBuiltHandler>>,
    singletons: Mutex<Disposals>,
    // Held while any plan is built for the first time.
    building: ReentrantMutex<()>,
    locked: AtomicBool,
    verified: AtomicBool,
}

#[derive(Default)]
struct Disposals {
    tracked: HashSet<usize>,
    hooks: Vec<DisposeHook>,
    disposed: bool,
}

/// Thread-safe dependency injection container.
///
/// A cheap handle: clones share the same registrations, singletons and
/// ambient scopes.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

/// Non-owning handle held by factories and collections handed to users.
#[derive(Clone)]
pub struct WeakContainer {
    inner: Weak<ContainerInner>,
}

impl WeakContainer {
    pub fn upgrade(&self) -> Option<Container> {
        self.inner.upgrade().map(|inner| Container { inner })
    }
}

impl fmt::Debug for WeakContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakContainer")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Container with default options.
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        debug!(container = id, execution = ?options.plan_execution, "Creating container");

        Self {
            inner: Arc::new(ContainerInner {
                id,
                options,
                scope_manager: ScopeManager::new(),
                explicit: DashMap::new(),
                order: Mutex::new(Vec::new()),
                resolved: DashMap::new(),
                collections: DashMap::new(),
                collection_producers: DashMap::new(),
                generics: RwLock::new(Vec::new()),
                decorators: RwLock::new(Vec::new()),
                unregistered_handlers: RwLock::new(Vec::new()),
                expression_built: RwLock::new(Vec::new()),
                singletons: Mutex::new(Disposals::default()),
                building: ReentrantMutex::new(()),
                locked: AtomicBool::new(false),
                verified: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Serializes first-time plan builds across threads.
    ///
    /// Re-entrant, so a thread building one plan can build its dependencies.
    /// With a single lock, threads entering a cyclic graph from different
    /// ends cannot wait on each other.
    pub(crate) fn plan_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.inner.building.lock()
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    /// The manager tracking this container's ambient scopes.
    pub fn scope_manager(&self) -> &ScopeManager {
        &self.inner.scope_manager
    }

    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ── Registration ──

    /// Registers `I` as the implementation of `S`.
    ///
    /// ```rust,ignore
    /// container.register::<dyn Logger, ConsoleLogger>(Lifestyle::Singleton)?;
    /// ```
    ///
    /// # Errors
    /// [`MawridError::ContainerLocked`] after the first resolution and
    /// [`MawridError::AlreadyRegistered`] for a duplicate key unless
    /// overriding is allowed.
    pub fn register<S, I>(&self, lifestyle: Lifestyle) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable + Implements<S>,
    {
        self.register_registration(TypeKey::of::<S>(), lifestyle.create_registration::<S, I>(self))
    }

    /// Registers `I` for `S` with the builder's default lifestyle.
    pub fn register_default<S, I>(&self) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable + Implements<S>,
    {
        let lifestyle = self.inner.options.default_lifestyle.clone();
        self.register::<S, I>(lifestyle)
    }

    /// Registers a factory closure for `S`.
    pub fn register_factory<S>(
        &self,
        lifestyle: Lifestyle,
        factory: impl Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    ) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_registration(
            TypeKey::of::<S>(),
            lifestyle.create_factory_registration::<S>(factory, self),
        )
    }

    /// Registers a factory that may produce nothing.
    ///
    /// Resolving fails with an activation error when it returns `None`.
    pub fn register_nullable_factory<S>(
        &self,
        lifestyle: Lifestyle,
        factory: impl Fn(&Container) -> Result<Option<Arc<S>>> + Send + Sync + 'static,
    ) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let factory: FactoryFn =
            Arc::new(move |container: &Container| Ok(factory(container)?.map(Instance::new)));
        let service = TypeKey::of::<S>();
        self.register_registration(service, Registration::new(service, lifestyle, Source::Factory(factory), self))
    }

    /// Registers an existing value as the singleton for `S`.
    pub fn register_instance<S>(&self, value: Arc<S>) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let service = TypeKey::of::<S>();
        self.register_registration(service, Registration::for_instance(Instance::new(value), service, self))
    }

    /// Maps `service` to an existing registration.
    ///
    /// Registering one registration under several keys shares its cached
    /// instance between them.
    pub fn register_registration(&self, service: TypeKey, registration: Arc<Registration>) -> Result<()> {
        if registration.container_id() != self.inner.id {
            return Err(MawridError::ForeignRegistration {
                service,
                implementation: registration.implementation(),
            });
        }
        self.check_unlocked(service)?;

        let lifestyle = registration.lifestyle().name();
        let implementation = registration.implementation();
        let producer = InstanceProducer::new(service, registration, Origin::Explicit);

        match self.inner.explicit.entry(service) {
            Entry::Occupied(mut entry) => {
                if !self.inner.options.allow_overriding_registrations {
                    return Err(MawridError::AlreadyRegistered(AlreadyRegisteredError { service }));
                }
                debug!(service = %service, "Overriding registration");
                entry.insert(producer);
            }
            Entry::Vacant(entry) => {
                entry.insert(producer);
                self.inner.order.lock().push(service);
            }
        }

        debug!(service = %service, implementation = %implementation, lifestyle = %lifestyle, "Registered");
        Ok(())
    }

    /// Registers every member of `family`. Members are closed when their
    /// service key is first requested.
    pub fn register_generic(&self, family: GenericFamily, lifestyle: Lifestyle) -> Result<()> {
        let family = Arc::new(family);
        for service in family.services() {
            self.check_unlocked(service)?;
        }
        debug!(family = family.name(), members = family.len(), lifestyle = %lifestyle, "Registered generic family");
        self.inner.generics.write().push((family, lifestyle));
        Ok(())
    }

    // ── Collections ──

    /// Adds `I` to the collection of `S`.
    pub fn append_to_collection<S, I>(&self, lifestyle: Lifestyle) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable + Implements<S>,
    {
        self.append(TypeKey::of::<S>(), lifestyle.create_registration::<S, I>(self))
    }

    pub fn append_factory_to_collection<S>(
        &self,
        lifestyle: Lifestyle,
        factory: impl Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static,
    ) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.append(TypeKey::of::<S>(), lifestyle.create_factory_registration::<S>(factory, self))
    }

    pub fn append_instance_to_collection<S>(&self, value: Arc<S>) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let service = TypeKey::of::<S>();
        self.append(service, Registration::for_instance(Instance::new(value), service, self))
    }

    fn append(&self, service: TypeKey, registration: Arc<Registration>) -> Result<()> {
        self.check_unlocked(service)?;
        let source = self.collection_source(service);
        debug!(
            service = %service,
            implementation = %registration.implementation(),
            lifestyle = %registration.lifestyle(),
            position = source.len(),
            "Appended to collection"
        );
        source.append(InstanceProducer::new(service, registration, Origin::Element));
        Ok(())
    }

    // ── Decorators ──

    /// Wraps every producer of `S` in `D`.
    ///
    /// # Errors
    /// [`MawridError::InvalidDecorator`] unless `D` takes exactly one `S`
    /// or `ServiceFactory<S>`.
    pub fn register_decorator<S, D>(&self, lifestyle: Lifestyle) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
        D: Injectable + Implements<S>,
    {
        self.add_decorator::<S, D>(lifestyle, None)
    }

    /// Like [`register_decorator`](Self::register_decorator), applied only
    /// where `predicate` holds.
    pub fn register_decorator_if<S, D>(
        &self,
        lifestyle: Lifestyle,
        predicate: impl Fn(&DecoratorContext<'_>) -> bool + Send + Sync + 'static,
    ) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
        D: Injectable + Implements<S>,
    {
        self.add_decorator::<S, D>(lifestyle, Some(Arc::new(predicate)))
    }

    /// Decorates every service one of the family's members is declared for.
    pub fn register_generic_decorator(&self, family: GenericFamily, lifestyle: Lifestyle) -> Result<()> {
        for service in family.services() {
            self.check_unlocked(service)?;
            if let Some(constructor) = family.close(service) {
                decorator::validate(service, constructor)?;
            }
        }
        debug!(family = family.name(), lifestyle = %lifestyle, "Registered generic decorator");
        self.inner.decorators.write().push(Arc::new(DecoratorRegistration::new(
            DecoratorSource::Generic(Arc::new(family)),
            lifestyle,
            None,
        )));
        Ok(())
    }

    fn add_decorator<S, D>(&self, lifestyle: Lifestyle, predicate: Option<decorator::DecoratorPredicate>) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
        D: Injectable + Implements<S>,
    {
        let service = TypeKey::of::<S>();
        self.check_unlocked(service)?;
        let constructor = Constructor::of::<S, D>();
        decorator::validate(service, &constructor)?;

        debug!(service = %service, decorator = %constructor.implementation(), lifestyle = %lifestyle, "Registered decorator");
        self.inner.decorators.write().push(Arc::new(DecoratorRegistration::new(
            DecoratorSource::Fixed { service, constructor },
            lifestyle,
            predicate,
        )));
        Ok(())
    }

    // ── Hooks ──

    /// Adds a handler asked for registrations of unknown keys, in order of
    /// addition. The first one answering `Some` wins.
    pub fn on_unregistered_type(
        &self,
        handler: impl Fn(TypeKey, &Container) -> Option<Arc<Registration>> + Send + Sync + 'static,
    ) -> Result<()> {
        self.check_unlocked(TypeKey::of::<UnregisteredTypeHandler>())?;
        self.inner.unregistered_handlers.write().push(Arc::new(handler));
        Ok(())
    }

    /// Adds a handler that sees every producer's plan after decoration.
    pub fn on_expression_built(&self, handler: impl Fn(&mut ExpressionBuilt) + Send + Sync + 'static) -> Result<()> {
        self.check_unlocked(TypeKey::of::<ExpressionBuiltHandler>())?;
        self.inner.expression_built.write().push(Arc::new(handler));
        Ok(())
    }

    /// Hands out `S` from a host-owned factory.
    ///
    /// The host owns the instances, so the registration is Transient and the
    /// disposable-transient diagnostic is suppressed for it.
    pub fn cross_wire<S>(&self, factory: impl Fn(&Container) -> Result<Arc<S>> + Send + Sync + 'static) -> Result<()>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let registration = Lifestyle::Transient.create_factory_registration::<S>(factory, self);
        registration.suppress_diagnostic_warning(
            DiagnosticKind::DisposableTransientComponent,
            "Cross-wired from the host, which disposes it",
        );
        self.register_registration(TypeKey::of::<S>(), registration)
    }

    // ── Resolution ──

    /// Resolves `S`.
    ///
    /// ```rust,ignore
    /// let logger: Arc<dyn Logger> = container.get_instance()?;
    /// ```
    pub fn get_instance<S>(&self) -> Result<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.get_instance_by_key(&TypeKey::of::<S>())?.expect::<S>()
    }

    /// Untyped resolution.
    pub fn get_instance_by_key(&self, service: &TypeKey) -> Result<Instance> {
        self.lock();
        trace!(service = %service, "Resolving");
        self.producer_for(*service, None, None)?.get_instance(self)
    }

    /// Resolves a concrete type, building it as Transient when nobody
    /// registered it.
    pub fn get_concrete<T: Injectable>(&self) -> Result<Arc<T>> {
        self.lock();
        let service = TypeKey::of::<T>();
        trace!(service = %service, "Resolving concrete");
        let dependency = Dependency::concrete::<T>();
        self.producer_for(service, dependency.implicit, None)?
            .get_instance(self)?
            .expect::<T>()
    }

    /// Lazy view over every implementation appended for `S`.
    ///
    /// Empty when nothing was appended.
    pub fn get_all_instances<S>(&self) -> Collection<S>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.lock();
        Collection::new(self.collection_source(TypeKey::of::<S>()), self.downgrade())
    }

    /// Untyped [`get_all_instances`](Self::get_all_instances): a lazy view
    /// that resolves elements as it is iterated.
    pub fn get_all_instances_by_key(&self, service: &TypeKey) -> Instances {
        self.lock();
        Instances::new(self.collection_source(*service), self.downgrade())
    }

    // ── Lookup ──

    pub fn get_registration<S: ?Sized + 'static>(&self) -> Option<Arc<InstanceProducer>> {
        self.get_registration_by_key(&TypeKey::of::<S>())
    }

    /// Producer for `service`, explicit or created by the container so far.
    pub fn get_registration_by_key(&self, service: &TypeKey) -> Option<Arc<InstanceProducer>> {
        if let Some(producer) = self.inner.explicit.get(service) {
            return Some(producer.value().clone());
        }
        self.inner.resolved.get(service).map(|p| p.value().clone())
    }

    /// Explicit producers in registration order, then those the container
    /// created on its own.
    pub fn get_current_registrations(&self) -> Vec<Arc<InstanceProducer>> {
        let order = self.inner.order.lock().clone();
        let mut producers: Vec<Arc<InstanceProducer>> = order
            .iter()
            .filter_map(|service| self.inner.explicit.get(service).map(|p| p.value().clone()))
            .collect();

        let mut resolved: Vec<Arc<InstanceProducer>> =
            self.inner.resolved.iter().map(|entry| entry.value().clone()).collect();
        resolved.sort_by_key(|p| p.service());
        producers.extend(resolved);
        producers
    }

    // ── Scopes ──

    /// Starts a scope nested in the current one. It ends when the guard drops.
    pub fn begin_scope(&self) -> ScopeGuard {
        self.inner.scope_manager.begin_scope()
    }

    pub fn current_scope(&self) -> Option<Scope> {
        self.inner.scope_manager.current()
    }

    /// Runs `future` with scopes that follow the task.
    #[cfg(feature = "async")]
    pub async fn flow<F: std::future::Future>(&self, future: F) -> F::Output {
        self.inner.scope_manager.flow(future).await
    }

    // ── State ──

    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    pub fn is_verified(&self) -> bool {
        self.inner.verified.load(Ordering::Acquire)
    }

    /// Builds, compiles and resolves everything once.
    ///
    /// Closes every generic family, compiles every explicit and collection
    /// producer plus everything they depend on, then resolves each root
    /// inside a temporary scope.
    ///
    /// # Errors
    /// The first failure found.
    #[instrument(skip(self), name = "container_verify")]
    pub fn verify(&self) -> Result<()> {
        info!(registered = self.inner.explicit.len(), "Verifying container");
        self.lock();

        let generics = self.inner.generics.read().clone();
        for (family, _) in &generics {
            for service in family.services() {
                self.producer_for(service, None, None)?;
            }
        }

        let roots = self.root_producers();
        for producer in &roots {
            producer.compile(self)?;
        }

        let graph = ProducerGraph::walk(roots.clone());
        for producer in graph.producers() {
            producer.compile(self)?;
        }

        {
            let _scope = self.begin_scope();
            for producer in &roots {
                producer.get_instance(self)?;
            }
        }

        self.inner.verified.store(true, Ordering::Release);
        info!(producers = graph.producers().len(), "Container verified ✓");
        Ok(())
    }

    /// Runs the diagnostic rules over the verified graph.
    pub fn analyze(&self) -> Result<DiagnosticReport> {
        Analyzer::analyze(self)
    }

    /// Disposes every materialized disposable singleton, newest first.
    ///
    /// Only the first call does anything.
    pub fn dispose(&self) {
        let hooks = {
            let mut singletons = self.inner.singletons.lock();
            if singletons.disposed {
                return;
            }
            singletons.disposed = true;
            std::mem::take(&mut singletons.hooks)
        };

        debug!(container = self.inner.id, singletons = hooks.len(), "Disposing container");
        for hook in hooks.into_iter().rev() {
            hook();
        }
    }

    // ── Engine internals ──

    fn lock(&self) {
        if !self.inner.locked.swap(true, Ordering::AcqRel) {
            debug!(container = self.inner.id, "Container locked");
        }
    }

    fn check_unlocked(&self, service: TypeKey) -> Result<()> {
        if self.is_locked() {
            return Err(MawridError::ContainerLocked { service });
        }
        Ok(())
    }

    /// Finds or creates the producer for `service`.
    ///
    /// Looks in explicit registrations, producers created earlier, generic
    /// families, unregistered-type handlers and finally, when `implicit` is
    /// given, builds the concrete type as Transient.
    pub(crate) fn producer_for(
        &self,
        service: TypeKey,
        implicit: Option<ImplicitRegistration>,
        consumer: Option<TypeKey>,
    ) -> Result<Arc<InstanceProducer>> {
        if let Some(producer) = self.get_registration_by_key(&service) {
            return Ok(producer);
        }

        let generics = self.inner.generics.read().clone();
        for (family, lifestyle) in &generics {
            if let Some(constructor) = family.close(service) {
                let registration = Registration::new(
                    constructor.implementation(),
                    lifestyle.clone(),
                    Source::Constructor(constructor.clone()),
                    self,
                );
                trace!(service = %service, family = family.name(), "Closed generic registration");
                return Ok(self.cache(InstanceProducer::new(service, registration, Origin::Explicit)));
            }
        }

        let handlers = self.inner.unregistered_handlers.read().clone();
        for handler in &handlers {
            if let Some(registration) = handler(service, self) {
                trace!(service = %service, implementation = %registration.implementation(), "Registration supplied by handler");
                return Ok(self.cache(InstanceProducer::new(service, registration, Origin::Explicit)));
            }
        }

        if let Some(implicit) = implicit.filter(|_| self.inner.options.resolve_unregistered_concrete_types) {
            // Cached before the plan is built, so a cycle back to it is
            // caught by its guard instead of creating another producer.
            let producer = self.cache(InstanceProducer::new(service, implicit(self), Origin::Implicit));
            if let Err(e) = producer.build_plan(self) {
                self.inner
                    .resolved
                    .remove_if(&service, |_, cached| Arc::ptr_eq(cached, &producer));
                return Err(implicit_failure(service, e));
            }
            debug!(service = %service, "Registered unregistered concrete type as Transient");
            return Ok(producer);
        }

        Err(MawridError::NotRegistered(NotRegisteredError {
            requested: service,
            required_by: consumer,
            suggestions: self.suggestions(service),
        }))
    }

    fn cache(&self, producer: Arc<InstanceProducer>) -> Arc<InstanceProducer> {
        self.inner
            .resolved
            .entry(producer.service())
            .or_insert(producer)
            .value()
            .clone()
    }

    fn suggestions(&self, service: TypeKey) -> Vec<String> {
        let names: Vec<String> = self
            .inner
            .explicit
            .iter()
            .map(|entry| entry.key().short_name())
            .collect();
        let available: Vec<&str> = names.iter().map(String::as_str).collect();
        let requested = service.short_name();
        closest_matches(requested.trim_start_matches("dyn "), &available, 3)
    }

    /// Plan for one constructor parameter of `consumer`, plus the producer
    /// the parameter resolves through.
    pub(crate) fn plan_for_dependency(
        &self,
        dependency: &Dependency,
        consumer: TypeKey,
    ) -> Result<(Plan, Arc<InstanceProducer>)> {
        let service = dependency.key();
        match dependency.wrap {
            Wrap::Plain => {
                let producer = self.producer_for(service, dependency.implicit, Some(consumer))?;
                let plan = producer.build_plan(self)?;
                Ok((plan, producer))
            }
            Wrap::Factory(wrap) => {
                let producer = self.producer_for(service, dependency.implicit, Some(consumer))?;
                let plan = Plan::Deferred {
                    service,
                    producer: producer.clone(),
                    wrap,
                };
                Ok((plan, producer))
            }
            Wrap::Collection(wrap) => {
                let producer = self.collection_producer(service, wrap);
                let plan = producer.build_plan(self)?;
                Ok((plan, producer))
            }
        }
    }

    /// Applies registered decorators to a producer's plan.
    pub(crate) fn decorate(
        &self,
        producer: &InstanceProducer,
        plan: Plan,
    ) -> Result<Decoration> {
        if producer.is_collection() || producer.is_decoratee() {
            return Ok(Decoration::undecorated(plan));
        }
        let decorators = self.inner.decorators.read().clone();
        if decorators.is_empty() {
            return Ok(Decoration::undecorated(plan));
        }
        decorator::decorate(self, &decorators, producer, plan)
    }

    /// Runs the expression-built handlers over a decorated plan.
    pub(crate) fn intercept(&self, producer: &InstanceProducer, plan: Plan) -> Plan {
        let handlers = self.inner.expression_built.read().clone();
        if handlers.is_empty() {
            return plan;
        }

        let mut event = ExpressionBuilt {
            service: producer.service(),
            registration: producer.registration().clone(),
            plan,
        };
        for handler in &handlers {
            handler(&mut event);
        }
        event.plan
    }

    /// Takes ownership of a singleton's dispose hook.
    pub(crate) fn track_singleton_disposal(&self, instance: &Instance, hook: DisposeHook) {
        let mut singletons = self.inner.singletons.lock();
        if singletons.tracked.insert(instance.address()) {
            singletons.hooks.push(hook);
        }
    }

    /// Where diagnostics and verification start: registrations, collection
    /// elements and collection producers.
    pub(crate) fn root_producers(&self) -> Vec<Arc<InstanceProducer>> {
        let mut roots = self.get_current_registrations();

        let mut sources: Vec<Arc<CollectionSource>> =
            self.inner.collections.iter().map(|entry| entry.value().clone()).collect();
        sources.sort_by_key(|source| source.service());
        for source in sources {
            roots.extend(source.producers());
        }

        let mut collections: Vec<Arc<InstanceProducer>> = self
            .inner
            .collection_producers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        collections.sort_by_key(|p| p.service());
        roots.extend(collections);
        roots
    }

    /// Element list for `service`, created empty on first use.
    pub(crate) fn collection_source(&self, service: TypeKey) -> Arc<CollectionSource> {
        self.inner
            .collections
            .entry(service)
            .or_insert_with(|| Arc::new(CollectionSource::new(service)))
            .value()
            .clone()
    }

    /// The producer handing out `Collection<S>` for `service`.
    pub(crate) fn collection_producer(&self, service: TypeKey, wrap: CollectionWrap) -> Arc<InstanceProducer> {
        if let Some(producer) = self.inner.collection_producers.get(&service) {
            return producer.value().clone();
        }

        let source = self.collection_source(service);
        let registration = Registration::for_collection(source.clone(), wrap, self);
        let producer = InstanceProducer::new(service, registration, Origin::Collection(source));
        self.inner
            .collection_producers
            .entry(service)
            .or_insert(producer)
            .value()
            .clone()
    }
}

fn implicit_failure(service: TypeKey, error: MawridError) -> MawridError {
    match error {
        MawridError::NotRegistered(e) => MawridError::activation(
            service,
            format!(
                "No registration for type {} could be found and an implicit registration could not be made. {e}",
                service.short_name()
            ),
        ),
        other => other,
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("registered", &self.inner.explicit.len())
            .field("locked", &self.is_locked())
            .field("verified", &self.is_verified())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder, ExpressionBuilt};
    pub use crate::collection::{Collection, Instances};
    pub use crate::decorator::DecoratorContext;
    pub use crate::diagnostics::{DiagnosticKind, DiagnosticReport, DiagnosticSeverity};
    pub use crate::error::{MawridError, Result};
    pub use crate::generic::GenericFamily;
    pub use crate::injectable::{Arguments, Dependency, Implements, Injectable, ServiceFactory};
    pub use crate::instance::{Disposable, Instance};
    pub use crate::key::TypeKey;
    pub use crate::lifestyle::Lifestyle;
    pub use crate::options::{ContainerOptions, PlanExecution};
    pub use crate::scope::{Scope, ScopeGuard};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
