//! Dependency edges recorded while plans are built.

use std::fmt;
use std::sync::Arc;

use crate::injectable::DependencyKind;
use crate::key::TypeKey;
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;

/// One consumer-to-dependency edge of the object graph.
///
/// Recorded when a registration (or a decorator layer) builds its plan, and
/// read back by the diagnostics analyzer.
#[derive(Clone)]
pub struct KnownRelationship {
    implementation: TypeKey,
    lifestyle: Lifestyle,
    dependency: Arc<InstanceProducer>,
    kind: DependencyKind,
}

impl KnownRelationship {
    pub fn new(
        implementation: TypeKey,
        lifestyle: Lifestyle,
        dependency: Arc<InstanceProducer>,
        kind: DependencyKind,
    ) -> Self {
        Self {
            implementation,
            lifestyle,
            dependency,
            kind,
        }
    }

    /// The consuming implementation.
    pub fn implementation(&self) -> TypeKey {
        self.implementation
    }

    /// Lifestyle of the consumer.
    pub fn lifestyle(&self) -> &Lifestyle {
        &self.lifestyle
    }

    /// Producer that supplies the dependency.
    pub fn dependency(&self) -> &Arc<InstanceProducer> {
        &self.dependency
    }

    pub fn kind(&self) -> DependencyKind {
        self.kind
    }
}

// Producers compare by identity.
impl PartialEq for KnownRelationship {
    fn eq(&self, other: &Self) -> bool {
        self.implementation == other.implementation
            && self.lifestyle == other.lifestyle
            && Arc::ptr_eq(&self.dependency, &other.dependency)
            && self.kind == other.kind
    }
}

impl Eq for KnownRelationship {}

impl fmt::Debug for KnownRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) -> {} ({:?})",
            self.implementation.short_name(),
            self.lifestyle,
            self.dependency.service().short_name(),
            self.kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::lifestyle::Lifestyle;

    struct Consumer;
    struct Clock;

    #[test]
    fn edges_compare_by_producer_identity() {
        let container = Container::new();
        let clock = InstanceProducer::for_instance(&container, Arc::new(Clock));
        let other = InstanceProducer::for_instance(&container, Arc::new(Clock));

        let edge = |producer: &Arc<InstanceProducer>| {
            KnownRelationship::new(
                TypeKey::of::<Consumer>(),
                Lifestyle::Transient,
                producer.clone(),
                DependencyKind::Service,
            )
        };

        assert_eq!(edge(&clock), edge(&clock));
        assert_ne!(edge(&clock), edge(&other));
        assert_eq!(format!("{:?}", edge(&clock)), "Consumer (Transient) -> Clock (Service)");
    }
}
