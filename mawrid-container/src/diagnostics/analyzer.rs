use tracing::{info, instrument};

use super::graph::ProducerGraph;
use super::result::DiagnosticReport;
use super::rules;
use crate::container::Container;
use crate::error::{MawridError, Result};

/// Runs every diagnostic rule over a verified container.
///
/// Analysis only reads: it never builds plans, resolves instances or
/// changes the container.
pub struct Analyzer;

impl Analyzer {
    /// # Errors
    /// [`MawridError::NotVerified`] unless `verify()` has succeeded.
    #[instrument(skip(container), name = "diagnostics_analyze")]
    pub fn analyze(container: &Container) -> Result<DiagnosticReport> {
        if !container.is_verified() {
            return Err(MawridError::NotVerified);
        }

        let graph = ProducerGraph::walk(container.root_producers());

        let mut results = rules::lifestyle_mismatches(&graph);
        results.extend(rules::disposable_transients(&graph));
        results.extend(rules::ambiguous_lifestyles(&graph));
        results.extend(rules::torn_lifestyles(&graph));
        results.extend(rules::single_responsibility(&graph));
        results.extend(rules::container_registered(&graph));

        let report = DiagnosticReport::new(results);
        info!(
            producers = graph.producers().len(),
            findings = report.len(),
            warnings = report.warnings().len(),
            "Diagnostics finished"
        );
        Ok(report)
    }
}
