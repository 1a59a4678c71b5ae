//! Diagnostic rules. Each one reads the producer graph and returns findings.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use mawrid_support::rendering::{PathEntry, render_edges};
use tracing::warn;

use super::graph::ProducerGraph;
use super::result::{DiagnosticKind, DiagnosticResult};
use crate::injectable::DependencyKind;
use crate::key::TypeKey;
use crate::lifestyle::Lifestyle;
use crate::producer::InstanceProducer;
use crate::registration::Registration;

/// Constructors with more distinct dependencies than this are reported.
pub const MAX_DEPENDENCIES: usize = 7;

pub(crate) fn lifestyle_mismatches(graph: &ProducerGraph) -> Vec<DiagnosticResult> {
    let mut results = Vec::new();

    for (producer, relationship) in graph.relationships() {
        if relationship.kind() != DependencyKind::Service {
            continue;
        }
        let dependency = relationship.dependency();
        // Decorators decide what the consumer captures.
        let dependency_lifestyle = dependency.effective_lifestyle();
        let dependency_implementation = dependency.effective_implementation();
        let consumer_length = relationship.lifestyle().component_length();
        if consumer_length <= dependency_lifestyle.dependency_length() {
            continue;
        }
        if producer.registration().is_suppressed(DiagnosticKind::LifestyleMismatch) {
            continue;
        }

        warn!(
            consumer = %relationship.implementation(),
            consumer_lifestyle = %relationship.lifestyle(),
            dependency = %dependency_implementation,
            dependency_lifestyle = %dependency_lifestyle,
            "Lifestyle mismatch"
        );

        let description = format!(
            "{} ({}) depends on {} implemented by {} ({}).\n{}",
            relationship.implementation().short_name(),
            relationship.lifestyle(),
            dependency.service().short_name(),
            dependency_implementation.short_name(),
            dependency_lifestyle,
            render_edges(&[
                PathEntry::new(
                    relationship.implementation().short_name(),
                    relationship.lifestyle().name()
                ),
                PathEntry::new(dependency_implementation.short_name(), dependency_lifestyle.name()),
            ])
        );
        results.push(
            DiagnosticResult::new(
                DiagnosticKind::LifestyleMismatch,
                producer.service(),
                relationship.implementation(),
                description,
            )
            .with_related(vec![dependency_implementation]),
        );
    }

    results
}

pub(crate) fn disposable_transients(graph: &ProducerGraph) -> Vec<DiagnosticResult> {
    distinct_registrations(graph)
        .into_iter()
        .filter(|(_, registration)| {
            *registration.lifestyle() == Lifestyle::Transient
                && registration.is_disposable()
                && !registration.is_suppressed(DiagnosticKind::DisposableTransientComponent)
        })
        .map(|(producer, registration)| {
            DiagnosticResult::new(
                DiagnosticKind::DisposableTransientComponent,
                producer.service(),
                registration.implementation(),
                format!(
                    "{} is registered as Transient, but is disposable. The container will not dispose it",
                    registration.implementation().short_name()
                ),
            )
        })
        .collect()
}

pub(crate) fn ambiguous_lifestyles(graph: &ProducerGraph) -> Vec<DiagnosticResult> {
    by_implementation(graph)
        .into_iter()
        .filter_map(|(implementation, producers)| {
            let lifestyles: BTreeSet<String> = producers.iter().map(|p| p.lifestyle().name()).collect();
            if lifestyles.len() < 2 || all_suppressed(&producers, DiagnosticKind::AmbiguousLifestyles) {
                return None;
            }
            let services: Vec<TypeKey> = producers.iter().map(|p| p.service()).collect();
            Some(
                DiagnosticResult::new(
                    DiagnosticKind::AmbiguousLifestyles,
                    producers[0].service(),
                    implementation,
                    format!(
                        "{} is registered with different lifestyles ({}) for the services {}",
                        implementation.short_name(),
                        lifestyles.into_iter().collect::<Vec<_>>().join(", "),
                        join_short(&services)
                    ),
                )
                .with_related(services),
            )
        })
        .collect()
}

pub(crate) fn torn_lifestyles(graph: &ProducerGraph) -> Vec<DiagnosticResult> {
    let mut results = Vec::new();

    for (implementation, producers) in by_implementation(graph) {
        let mut by_lifestyle: BTreeMap<String, Vec<&Arc<InstanceProducer>>> = BTreeMap::new();
        for producer in producers.iter().copied() {
            if producer.lifestyle().is_cached() {
                by_lifestyle.entry(producer.lifestyle().name()).or_default().push(producer);
            }
        }

        for (lifestyle, group) in by_lifestyle {
            let registrations: HashSet<*const Registration> =
                group.iter().map(|p| Arc::as_ptr(p.registration())).collect();
            if registrations.len() < 2
                || group
                    .iter()
                    .all(|p| p.registration().is_suppressed(DiagnosticKind::TornLifestyle))
            {
                continue;
            }
            let services: Vec<TypeKey> = group.iter().map(|p| p.service()).collect();
            results.push(
                DiagnosticResult::new(
                    DiagnosticKind::TornLifestyle,
                    group[0].service(),
                    implementation,
                    format!(
                        "{} is registered as {lifestyle} through {} separate registrations for {}, \
                         so each one holds its own instance",
                        implementation.short_name(),
                        registrations.len(),
                        join_short(&services)
                    ),
                )
                .with_related(services),
            );
        }
    }

    results
}

pub(crate) fn single_responsibility(graph: &ProducerGraph) -> Vec<DiagnosticResult> {
    distinct_registrations(graph)
        .into_iter()
        .filter_map(|(producer, registration)| {
            let dependencies: BTreeSet<TypeKey> = registration.dependencies().iter().map(|d| d.key()).collect();
            if dependencies.len() <= MAX_DEPENDENCIES
                || registration.is_suppressed(DiagnosticKind::SingleResponsibilityViolation)
            {
                return None;
            }
            Some(
                DiagnosticResult::new(
                    DiagnosticKind::SingleResponsibilityViolation,
                    producer.service(),
                    registration.implementation(),
                    format!(
                        "{} has {} dependencies, which might indicate a SRP violation",
                        registration.implementation().short_name(),
                        dependencies.len()
                    ),
                )
                .with_related(dependencies.into_iter().collect()),
            )
        })
        .collect()
}

pub(crate) fn container_registered(graph: &ProducerGraph) -> Vec<DiagnosticResult> {
    graph
        .components()
        .filter(|p| p.is_implicit() && !p.registration().is_suppressed(DiagnosticKind::ContainerRegistered))
        .map(|producer| {
            DiagnosticResult::new(
                DiagnosticKind::ContainerRegistered,
                producer.service(),
                producer.implementation(),
                format!(
                    "{} was not registered explicitly and is resolved as Transient by the container",
                    producer.service().short_name()
                ),
            )
        })
        .collect()
}

fn distinct_registrations(graph: &ProducerGraph) -> Vec<(&Arc<InstanceProducer>, &Arc<Registration>)> {
    let mut seen = HashSet::new();
    graph
        .components()
        .filter(|p| seen.insert(Arc::as_ptr(p.registration())))
        .map(|p| (p, p.registration()))
        .collect()
}

fn by_implementation(graph: &ProducerGraph) -> BTreeMap<TypeKey, Vec<&Arc<InstanceProducer>>> {
    let mut groups: BTreeMap<TypeKey, Vec<&Arc<InstanceProducer>>> = BTreeMap::new();
    for producer in graph.components() {
        groups.entry(producer.implementation()).or_default().push(producer);
    }
    groups
}

fn all_suppressed(producers: &[&Arc<InstanceProducer>], kind: DiagnosticKind) -> bool {
    producers.iter().all(|p| p.registration().is_suppressed(kind))
}

fn join_short(keys: &[TypeKey]) -> String {
    keys.iter().map(TypeKey::short_name).collect::<Vec<_>>().join(", ")
}
