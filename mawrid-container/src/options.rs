//! Container configuration.

use crate::lifestyle::Lifestyle;

/// How producers run their construction plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanExecution {
    /// Compile each plan once into a closure tree.
    #[default]
    Compiled,
    /// Walk the plan tree on every resolution.
    Interpreted,
}

/// Settings fixed when the container is built.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Let a registration replace an earlier one for the same service.
    pub allow_overriding_registrations: bool,
    /// Build unregistered concrete dependencies as Transient.
    pub resolve_unregistered_concrete_types: bool,
    pub plan_execution: PlanExecution,
    /// Lifestyle used by `register_default`.
    pub default_lifestyle: Lifestyle,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            allow_overriding_registrations: false,
            resolve_unregistered_concrete_types: true,
            plan_execution: PlanExecution::Compiled,
            default_lifestyle: Lifestyle::Transient,
        }
    }
}
