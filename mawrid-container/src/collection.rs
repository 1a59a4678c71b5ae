//! Container-controlled collections.
//!
//! Every implementation appended for a service becomes an element producer
//! of that service's [`CollectionSource`]. A [`Collection<S>`] is a lazy
//! view over the source: each [`iter`](Collection::iter) re-reads the
//! element list and resolves elements one by one, honouring each element's
//! lifestyle. [`Instances`] is the untyped view, for callers that only hold
//! a [`TypeKey`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::container::{Container, WeakContainer};
use crate::error::{MawridError, Result};
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::producer::InstanceProducer;

/// Element producers appended for one service.
pub struct CollectionSource {
    service: TypeKey,
    producers: RwLock<Vec<Arc<InstanceProducer>>>,
}

impl CollectionSource {
    pub(crate) fn new(service: TypeKey) -> Self {
        Self {
            service,
            producers: RwLock::new(Vec::new()),
        }
    }

    pub fn service(&self) -> TypeKey {
        self.service
    }

    pub(crate) fn append(&self, producer: Arc<InstanceProducer>) {
        self.producers.write().push(producer);
    }

    /// Snapshot of the element producers, in append order.
    pub fn producers(&self) -> Vec<Arc<InstanceProducer>> {
        self.producers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.producers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.read().is_empty()
    }
}

impl fmt::Debug for CollectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSource")
            .field("service", &self.service)
            .field("len", &self.len())
            .finish()
    }
}

/// Untyped, lazy, restartable sequence of the elements appended for one
/// service key.
///
/// [`Collection<S>`] is the typed view over the same thing.
#[derive(Clone)]
pub struct Instances {
    source: Arc<CollectionSource>,
    container: WeakContainer,
}

impl Instances {
    pub(crate) fn new(source: Arc<CollectionSource>, container: WeakContainer) -> Self {
        Self { source, container }
    }

    pub fn service(&self) -> TypeKey {
        self.source.service
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Resolves the element at `index`.
    pub fn get(&self, index: usize) -> Option<Result<Instance>> {
        let producer = self.source.producers().get(index)?.clone();
        Some(self.container().and_then(|container| producer.get_instance(&container)))
    }

    /// Iterates the elements, resolving each on demand.
    ///
    /// Every call starts over from the current element list.
    pub fn iter(&self) -> InstancesIter {
        InstancesIter {
            service: self.source.service,
            producers: self.source.producers().into_iter(),
            container: self.container.upgrade(),
        }
    }

    /// Resolves every element, stopping at the first failure.
    pub fn to_vec(&self) -> Result<Vec<Instance>> {
        self.iter().collect()
    }

    fn container(&self) -> Result<Container> {
        self.container.upgrade().ok_or_else(|| dropped(self.source.service))
    }
}

impl fmt::Debug for Instances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instances<{}>({})", self.source.service, self.source.len())
    }
}

impl<'a> IntoIterator for &'a Instances {
    type Item = Result<Instance>;
    type IntoIter = InstancesIter;

    fn into_iter(self) -> InstancesIter {
        self.iter()
    }
}

/// Iterator returned by [`Instances::iter`].
pub struct InstancesIter {
    service: TypeKey,
    producers: std::vec::IntoIter<Arc<InstanceProducer>>,
    container: Option<Container>,
}

impl Iterator for InstancesIter {
    type Item = Result<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        let producer = self.producers.next()?;
        Some(match &self.container {
            Some(container) => producer.get_instance(container),
            None => Err(dropped(self.service)),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.producers.size_hint()
    }
}

fn dropped(service: TypeKey) -> MawridError {
    MawridError::activation(
        service,
        format!(
            "The container that produced this collection of {} has been dropped",
            service.short_name()
        ),
    )
}

/// Lazy, restartable sequence of every implementation appended for `S`.
pub struct Collection<S: ?Sized> {
    instances: Instances,
    _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> Collection<S> {
    pub(crate) fn new(source: Arc<CollectionSource>, container: WeakContainer) -> Self {
        Self {
            instances: Instances::new(source, container),
            _service: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Resolves the element at `index`.
    pub fn get(&self, index: usize) -> Option<Result<Arc<S>>> {
        Some(self.instances.get(index)?.and_then(|instance| instance.expect::<S>()))
    }

    /// Iterates the elements, resolving each on demand.
    pub fn iter(&self) -> CollectionIter<S> {
        CollectionIter {
            inner: self.instances.iter(),
            _service: PhantomData,
        }
    }

    /// Resolves every element, stopping at the first failure.
    pub fn to_vec(&self) -> Result<Vec<Arc<S>>> {
        self.iter().collect()
    }

    /// The untyped view over the same elements.
    pub fn untyped(&self) -> &Instances {
        &self.instances
    }
}

impl<S: ?Sized> Clone for Collection<S> {
    fn clone(&self) -> Self {
        Self {
            instances: self.instances.clone(),
            _service: PhantomData,
        }
    }
}

impl<S: ?Sized> fmt::Debug for Collection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collection<{}>({})", std::any::type_name::<S>(), self.instances.len())
    }
}

impl<'a, S: ?Sized + Send + Sync + 'static> IntoIterator for &'a Collection<S> {
    type Item = Result<Arc<S>>;
    type IntoIter = CollectionIter<S>;

    fn into_iter(self) -> CollectionIter<S> {
        self.iter()
    }
}

/// Iterator returned by [`Collection::iter`].
pub struct CollectionIter<S: ?Sized> {
    inner: InstancesIter,
    _service: PhantomData<fn() -> Arc<S>>,
}

impl<S: ?Sized + Send + Sync + 'static> Iterator for CollectionIter<S> {
    type Item = Result<Arc<S>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.inner.next()?.and_then(|instance| instance.expect::<S>()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Plugin: Send + Sync {
        fn name(&self) -> &'static str;
    }

    struct Audit;
    impl Plugin for Audit {
        fn name(&self) -> &'static str {
            "audit"
        }
    }

    struct Metrics;
    impl Plugin for Metrics {
        fn name(&self) -> &'static str {
            "metrics"
        }
    }

    fn plugin_source(container: &Container) -> Arc<CollectionSource> {
        let source = Arc::new(CollectionSource::new(TypeKey::of::<dyn Plugin>()));
        source.append(InstanceProducer::for_instance::<dyn Plugin>(container, Arc::new(Audit)));
        source.append(InstanceProducer::for_instance::<dyn Plugin>(container, Arc::new(Metrics)));
        source
    }

    #[test]
    fn iterates_in_append_order() {
        let container = Container::new();
        let collection = Collection::<dyn Plugin>::new(plugin_source(&container), container.downgrade());

        let names: Vec<_> = collection.iter().map(|p| p.unwrap().name()).collect();
        assert_eq!(names, vec!["audit", "metrics"]);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.get(1).unwrap().unwrap().name(), "metrics");
        assert!(collection.get(2).is_none());
    }

    #[test]
    fn iteration_restarts_from_current_source() {
        let container = Container::new();
        let source = plugin_source(&container);
        let collection = Collection::<dyn Plugin>::new(source.clone(), container.downgrade());
        assert_eq!(collection.iter().count(), 2);

        source.append(InstanceProducer::for_instance::<dyn Plugin>(&container, Arc::new(Audit)));
        assert_eq!(collection.iter().count(), 3);
    }

    #[test]
    fn untyped_view_resolves_lazily_and_restarts() {
        let container = Container::new();
        let source = plugin_source(&container);
        let instances = Instances::new(source.clone(), container.downgrade());

        let first: Vec<Instance> = instances.to_vec().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].expect::<dyn Plugin>().unwrap().name(), "audit");

        source.append(InstanceProducer::for_instance::<dyn Plugin>(&container, Arc::new(Metrics)));
        let names: Vec<_> = instances
            .iter()
            .map(|i| i.unwrap().expect::<dyn Plugin>().unwrap().name())
            .collect();
        assert_eq!(names, vec!["audit", "metrics", "metrics"]);
        assert!(instances.service().is::<dyn Plugin>());
    }

    #[test]
    fn dropped_container_is_reported() {
        let container = Container::new();
        let collection = Collection::<dyn Plugin>::new(plugin_source(&container), container.downgrade());
        drop(container);

        match collection.to_vec() {
            Err(MawridError::Activation(e)) => assert!(e.message.contains("dropped")),
            Err(other) => panic!("Expected Activation, got: {other:?}"),
            Ok(_) => panic!("Expected Activation, got Ok"),
        }
    }
}
