//! The producer graph the rules run over.
//!
//! Walks from every registered and collection-element producer along the
//! recorded relationships and collection children. Producers are keyed by
//! identity, so cycles and shared producers are visited once.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::producer::InstanceProducer;
use crate::relationship::KnownRelationship;

pub(crate) struct ProducerGraph {
    producers: Vec<Arc<InstanceProducer>>,
}

impl ProducerGraph {
    /// Collects every producer reachable from `roots`.
    pub fn walk(roots: Vec<Arc<InstanceProducer>>) -> Self {
        let mut visited: HashSet<*const InstanceProducer> = HashSet::new();
        let mut producers = Vec::new();
        let mut pending = roots;
        pending.reverse();

        while let Some(producer) = pending.pop() {
            if !visited.insert(Arc::as_ptr(&producer)) {
                continue;
            }

            for relationship in producer.relationships().into_iter().rev() {
                pending.push(relationship.dependency().clone());
            }
            for element in producer.collection_elements().into_iter().rev() {
                pending.push(element);
            }
            producers.push(producer);
        }

        debug!(producers = producers.len(), "Walked producer graph");
        Self { producers }
    }

    pub fn producers(&self) -> &[Arc<InstanceProducer>] {
        &self.producers
    }

    /// Producers a user would recognise as registrations: no decoratees and
    /// no collection wrappers.
    pub fn components(&self) -> impl Iterator<Item = &Arc<InstanceProducer>> {
        self.producers
            .iter()
            .filter(|p| !p.is_decoratee() && !p.is_collection())
    }

    /// Every distinct edge, paired with the producer that recorded it.
    ///
    /// A decorated producer and its decoratees share a registration and so
    /// share its edges; each edge is returned once.
    pub fn relationships(&self) -> Vec<(&Arc<InstanceProducer>, KnownRelationship)> {
        let mut seen: Vec<KnownRelationship> = Vec::new();
        let mut edges = Vec::new();
        for producer in &self.producers {
            for relationship in producer.relationships() {
                if seen.contains(&relationship) {
                    continue;
                }
                seen.push(relationship.clone());
                edges.push((producer, relationship));
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::error::Result;
    use crate::injectable::{Arguments, Dependency, Injectable};
    use crate::lifestyle::Lifestyle;

    struct Leaf;
    impl Injectable for Leaf {
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Leaf)
        }
    }

    struct Branch;
    impl Injectable for Branch {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<Leaf>(), Dependency::on::<Leaf>()]
        }
        fn construct(_: &mut Arguments) -> Result<Self> {
            Ok(Branch)
        }
    }

    #[test]
    fn shared_producers_are_visited_once() {
        let container = Container::new();
        container.register::<Leaf, Leaf>(Lifestyle::Singleton).unwrap();
        container.register::<Branch, Branch>(Lifestyle::Transient).unwrap();
        container.verify().unwrap();

        let branch = container.get_registration::<Branch>().unwrap();
        let graph = ProducerGraph::walk(vec![branch.clone(), branch]);

        assert_eq!(graph.producers().len(), 2);
        assert_eq!(graph.components().count(), 2);
        // Both parameters point at the same producer.
        assert_eq!(graph.relationships().len(), 1);
    }
}
