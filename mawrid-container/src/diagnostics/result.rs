//! Diagnostic findings.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::key::TypeKey;

/// The rule a finding comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DiagnosticKind {
    /// A component depends on something that lives shorter than itself.
    LifestyleMismatch,
    /// A transient component owns resources nobody will release.
    DisposableTransientComponent,
    /// One implementation is registered with different lifestyles.
    AmbiguousLifestyles,
    /// One implementation is cached by several registrations, so several
    /// "single" instances exist.
    TornLifestyle,
    /// A constructor takes too many dependencies.
    SingleResponsibilityViolation,
    /// The container registered a concrete type on its own.
    ContainerRegistered,
}

impl DiagnosticKind {
    pub fn severity(&self) -> DiagnosticSeverity {
        match self {
            DiagnosticKind::SingleResponsibilityViolation | DiagnosticKind::ContainerRegistered => {
                DiagnosticSeverity::Information
            }
            _ => DiagnosticSeverity::Warning,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::LifestyleMismatch => "Lifestyle Mismatch",
            DiagnosticKind::DisposableTransientComponent => "Disposable Transient Component",
            DiagnosticKind::AmbiguousLifestyles => "Ambiguous Lifestyles",
            DiagnosticKind::TornLifestyle => "Torn Lifestyle",
            DiagnosticKind::SingleResponsibilityViolation => "Single Responsibility Violation",
            DiagnosticKind::ContainerRegistered => "Container-registered Component",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DiagnosticSeverity {
    Information,
    Warning,
}

/// One finding of the analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticResult {
    pub kind: DiagnosticKind,
    pub severity: DiagnosticSeverity,
    /// Service of the producer the finding is about
    pub service: TypeKey,
    /// Implementation the finding is about
    pub implementation: TypeKey,
    pub description: String,
    /// Other implementations involved, such as the short-lived dependency
    pub related: Vec<TypeKey>,
}

impl DiagnosticResult {
    pub(crate) fn new(
        kind: DiagnosticKind,
        service: TypeKey,
        implementation: TypeKey,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            service,
            implementation,
            description: description.into(),
            related: Vec::new(),
        }
    }

    pub(crate) fn with_related(mut self, related: Vec<TypeKey>) -> Self {
        self.related = related;
        self
    }
}

impl fmt::Display for DiagnosticResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.service.short_name(), self.description)
    }
}

/// Everything the analyzer found, in a stable order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticReport {
    results: Vec<DiagnosticResult>,
}

impl DiagnosticReport {
    pub(crate) fn new(mut results: Vec<DiagnosticResult>) -> Self {
        results.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.service.cmp(&b.service))
                .then_with(|| a.implementation.cmp(&b.implementation))
        });
        Self { results }
    }

    pub fn results(&self) -> &[DiagnosticResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Findings of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<&DiagnosticResult> {
        self.results.iter().filter(|r| r.kind == kind).collect()
    }

    /// Findings with warning severity.
    pub fn warnings(&self) -> Vec<&DiagnosticResult> {
        self.results
            .iter()
            .filter(|r| r.severity == DiagnosticSeverity::Warning)
            .collect()
    }

    pub fn group_by_kind(&self) -> BTreeMap<DiagnosticKind, Vec<&DiagnosticResult>> {
        let mut groups: BTreeMap<DiagnosticKind, Vec<&DiagnosticResult>> = BTreeMap::new();
        for result in &self.results {
            groups.entry(result.kind).or_default().push(result);
        }
        groups
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.results.is_empty() {
            return f.write_str("No diagnostic warnings");
        }
        for (kind, results) in self.group_by_kind() {
            writeln!(f, "{kind} ({}):", results.len())?;
            for result in results {
                writeln!(f, "  - {}: {}", result.service.short_name(), result.description)?;
            }
        }
        Ok(())
    }
}
