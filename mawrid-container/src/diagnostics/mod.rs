//! Static analysis of a verified object graph.
//!
//! The analyzer walks every producer reachable from the container's
//! registrations and reports configuration smells: lifestyle mismatches,
//! disposable transients, ambiguous or torn lifestyles, constructors with
//! too many dependencies and implicitly registered components.
//!
//! Findings are values, not errors. Suppress one for a registration with
//! [`Registration::suppress_diagnostic_warning`](crate::registration::Registration::suppress_diagnostic_warning).

mod analyzer;
pub(crate) mod graph;
mod result;
mod rules;

pub use analyzer::Analyzer;
pub use result::{DiagnosticKind, DiagnosticReport, DiagnosticResult, DiagnosticSeverity};
pub use rules::MAX_DEPENDENCIES;
