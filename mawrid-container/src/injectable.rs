//! Constructor descriptions.
//!
//! Rust has no runtime constructor discovery, so implementation types
//! describe their constructor statically through [`Injectable`]: which
//! services it takes, in order, and how to build `Self` from them.
//!
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
//! struct ReportGenerator {
//!     logger: Arc<dyn Logger>,
//! }
//! impl Injectable for ReportGenerator {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::on::<dyn Logger>()]
//!     }
//!     fn construct(args: &mut Arguments) -> Result<Self> {
//!         Ok(ReportGenerator { logger: args.get()? })
//!     }
//! }
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::collection::{Collection, CollectionSource};
use crate::container::{Container, WeakContainer};
use crate::error::{MawridError, Result};
use crate::instance::{Created, DisposeHook, Instance};
use crate::key::TypeKey;
use crate::lifestyle::Lifestyle;
use crate::plan::InstanceCreator;
use crate::registration::Registration;

/// A type the container knows how to construct.
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Constructor parameters, in the order [`construct`](Self::construct)
    /// reads them from [`Arguments`].
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Builds the value from resolved arguments.
    fn construct(args: &mut Arguments) -> Result<Self>;

    /// Cleanup for instances owning resources.
    ///
    /// Return `Some(<Self as Disposable>::dispose)` to have scoped instances
    /// disposed with their scope and singletons with the container.
    fn disposer() -> Option<fn(&Self)> {
        None
    }
}

/// Upcast from an implementation to the service it is registered for.
///
/// Every type implements itself. Trait services need one impl per
/// implementation, usually through [`implements!`](crate::implements).
pub trait Implements<S: ?Sized + 'static>: Send + Sync + 'static {
    fn upcast(self: Arc<Self>) -> Arc<S>;
}

impl<T: Send + Sync + 'static> Implements<T> for T {
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Declares that implementation types can stand in for trait services.
///
/// ```rust,ignore
/// mawrid_container::implements!(ConsoleLogger => dyn Logger, FileLogger => dyn Logger);
/// ```
#[macro_export]
macro_rules! implements {
    ($($implementation:ty => $service:ty),+ $(,)?) => {
        $(
            impl $crate::injectable::Implements<$service> for $implementation {
                fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$service> {
                    self
                }
            }
        )+
    };
}

/// How a constructor parameter is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum DependencyKind {
    /// The service itself, `Arc<S>`
    Service,
    /// A [`ServiceFactory<S>`] producing the service on demand
    Factory,
    /// A [`Collection<S>`] of every appended implementation
    Collection,
}

pub(crate) type FactoryWrap = fn(InstanceCreator, WeakContainer) -> Instance;
pub(crate) type CollectionWrap = fn(Arc<CollectionSource>, WeakContainer) -> Instance;
pub(crate) type ImplicitRegistration = fn(&Container) -> Arc<Registration>;

#[derive(Clone, Copy)]
pub(crate) enum Wrap {
    Plain,
    Factory(FactoryWrap),
    Collection(CollectionWrap),
}

/// One constructor parameter.
#[derive(Clone)]
pub struct Dependency {
    key: TypeKey,
    kind: DependencyKind,
    pub(crate) wrap: Wrap,
    pub(crate) implicit: Option<ImplicitRegistration>,
}

impl Dependency {
    /// Parameter of type `Arc<S>`.
    pub fn on<S: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<S>(),
            kind: DependencyKind::Service,
            wrap: Wrap::Plain,
            implicit: None,
        }
    }

    /// Parameter of concrete type `Arc<T>` that may be left unregistered.
    ///
    /// When `T` has no registration the container builds it as Transient,
    /// unless unregistered-type resolution is switched off.
    pub fn concrete<T: Injectable>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            kind: DependencyKind::Service,
            wrap: Wrap::Plain,
            implicit: Some(implicit_registration::<T>),
        }
    }

    /// Parameter of type [`ServiceFactory<S>`].
    pub fn factory<S: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<S>(),
            kind: DependencyKind::Factory,
            wrap: Wrap::Factory(wrap_factory::<S>),
            implicit: None,
        }
    }

    /// Parameter of type [`Collection<S>`].
    pub fn collection<S: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<S>(),
            kind: DependencyKind::Collection,
            wrap: Wrap::Collection(wrap_collection::<S>),
            implicit: None,
        }
    }

    /// The service this parameter refers to.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn kind(&self) -> DependencyKind {
        self.kind
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

fn implicit_registration<T: Injectable>(container: &Container) -> Arc<Registration> {
    Lifestyle::Transient.create_registration::<T, T>(container)
}

fn wrap_factory<S: ?Sized + Send + Sync + 'static>(
    creator: InstanceCreator,
    container: WeakContainer,
) -> Instance {
    Instance::new(Arc::new(ServiceFactory::<S>::new(creator, container)))
}

fn wrap_collection<S: ?Sized + Send + Sync + 'static>(
    source: Arc<CollectionSource>,
    container: WeakContainer,
) -> Instance {
    Instance::new(Arc::new(Collection::<S>::new(source, container)))
}

/// Produces `Arc<S>` on every call, honouring the service's lifestyle.
///
/// Handy for breaking cycles and as the decoratee of decorators that
/// create the wrapped service lazily.
pub struct ServiceFactory<S: ?Sized> {
    creator: InstanceCreator,
    container: WeakContainer,
    _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> ServiceFactory<S> {
    pub(crate) fn new(creator: InstanceCreator, container: WeakContainer) -> Self {
        Self {
            creator,
            container,
            _service: PhantomData,
        }
    }

    /// Creates (or fetches, for cached lifestyles) the service.
    pub fn create(&self) -> Result<Arc<S>> {
        let container = self.container.upgrade().ok_or_else(|| {
            MawridError::activation(
                TypeKey::of::<S>(),
                format!(
                    "The container that produced this factory for {} has been dropped",
                    TypeKey::of::<S>().short_name()
                ),
            )
        })?;
        let created = (self.creator)(&container)?;
        created.instance.expect::<S>()
    }
}

impl<S: ?Sized> Clone for ServiceFactory<S> {
    fn clone(&self) -> Self {
        Self {
            creator: self.creator.clone(),
            container: self.container.clone(),
            _service: PhantomData,
        }
    }
}

impl<S: ?Sized> fmt::Debug for ServiceFactory<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceFactory<{}>", std::any::type_name::<S>())
    }
}

/// Resolved constructor arguments, consumed in declaration order.
pub struct Arguments {
    implementation: TypeKey,
    values: std::vec::IntoIter<Instance>,
    position: usize,
}

impl Arguments {
    pub(crate) fn new(implementation: TypeKey, values: Vec<Instance>) -> Self {
        Self {
            implementation,
            values: values.into_iter(),
            position: 0,
        }
    }

    fn next(&mut self) -> Result<Instance> {
        let position = self.position;
        self.position += 1;
        self.values.next().ok_or_else(|| {
            MawridError::ConstructionFailed {
                implementation: self.implementation,
                source: format!(
                    "constructor read argument #{position} but only {position} dependencies were declared"
                )
                .into(),
            }
        })
    }

    /// Next argument, declared with [`Dependency::on`] or [`Dependency::concrete`].
    pub fn get<S: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<S>> {
        self.next()?.expect::<S>()
    }

    /// Next argument, declared with [`Dependency::factory`].
    pub fn factory<S: ?Sized + Send + Sync + 'static>(&mut self) -> Result<ServiceFactory<S>> {
        let value = self.next()?.expect::<ServiceFactory<S>>()?;
        Ok((*value).clone())
    }

    /// Next argument, declared with [`Dependency::collection`].
    pub fn collection<S: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Collection<S>> {
        let value = self.next()?.expect::<Collection<S>>()?;
        Ok((*value).clone())
    }

    /// Arguments not read yet.
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

pub(crate) type ConstructFn = Arc<dyn Fn(&mut Arguments) -> Result<Created> + Send + Sync>;

/// Type-erased constructor of one implementation, upcast to one service.
#[derive(Clone)]
pub struct Constructor {
    pub(crate) implementation: TypeKey,
    pub(crate) parameters: fn() -> Vec<Dependency>,
    pub(crate) construct: ConstructFn,
    pub(crate) disposable: bool,
}

impl Constructor {
    /// Describes how `I` is built when requested as `S`.
    pub fn of<S, I>() -> Self
    where
        S: ?Sized + Send + Sync + 'static,
        I: Injectable + Implements<S>,
    {
        let construct: ConstructFn = Arc::new(|args: &mut Arguments| {
            let value = Arc::new(I::construct(args)?);
            let dispose = I::disposer().map(|hook| {
                let owned = value.clone();
                Arc::new(move || hook(&owned)) as DisposeHook
            });
            let service = <I as Implements<S>>::upcast(value);
            Ok(Created::with_hook(Instance::new(service), dispose))
        });

        Self {
            implementation: TypeKey::of::<I>(),
            parameters: I::dependencies,
            construct,
            disposable: I::disposer().is_some(),
        }
    }

    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    /// Walks the constructor's parameter list.
    pub fn dependencies(&self) -> Vec<Dependency> {
        (self.parameters)()
    }

    pub fn is_disposable(&self) -> bool {
        self.disposable
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("implementation", &self.implementation)
            .field("dependencies", &self.dependencies())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Disposable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    impl Injectable for English {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(English)
        }
    }

    crate::implements!(English => dyn Greeter);

    static DISPOSED: AtomicUsize = AtomicUsize::new(0);

    struct Connection;

    impl Disposable for Connection {
        fn dispose(&self) {
            DISPOSED.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Injectable for Connection {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Connection)
        }

        fn disposer() -> Option<fn(&Self)> {
            Some(<Self as Disposable>::dispose)
        }
    }

    #[test]
    fn constructor_upcasts_to_service() {
        let ctor = Constructor::of::<dyn Greeter, English>();
        assert!(ctor.implementation().is::<English>());
        assert!(!ctor.is_disposable());

        let created = (ctor.construct)(&mut Arguments::new(ctor.implementation, vec![])).unwrap();
        let greeter = created.instance.downcast::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn constructor_carries_dispose_hook() {
        let ctor = Constructor::of::<Connection, Connection>();
        assert!(ctor.is_disposable());

        let created = (ctor.construct)(&mut Arguments::new(ctor.implementation, vec![])).unwrap();
        let hook = created.dispose.expect("disposable instance has a hook");
        hook();
        assert_eq!(DISPOSED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arguments_read_in_order() {
        let mut args = Arguments::new(
            TypeKey::of::<English>(),
            vec![
                Instance::new(Arc::new(1u32)),
                Instance::new(Arc::new(String::from("two"))),
            ],
        );
        assert_eq!(args.remaining(), 2);
        assert_eq!(*args.get::<u32>().unwrap(), 1);
        assert_eq!(*args.get::<String>().unwrap(), "two");
        assert!(args.get::<u32>().is_err());
    }

    #[test]
    fn dependency_kinds() {
        assert_eq!(Dependency::on::<dyn Greeter>().kind(), DependencyKind::Service);
        assert_eq!(Dependency::factory::<dyn Greeter>().kind(), DependencyKind::Factory);
        assert_eq!(
            Dependency::collection::<dyn Greeter>().kind(),
            DependencyKind::Collection
        );
        assert!(Dependency::concrete::<English>().implicit.is_some());
        assert_eq!(Dependency::on::<dyn Greeter>().key(), TypeKey::of::<dyn Greeter>());
    }
}
