//! Error types for Mawrid container operations.
//!
//! Three kinds of failure leave the engine:
//! - **activation** errors, when an instance could not be produced
//! - **cyclic dependency** errors, when a graph refers back to itself
//! - **configuration** errors, raised immediately by registration calls
//!
//! Diagnostic findings are not errors; see [`crate::diagnostics`].

use std::fmt;

use mawrid_support::rendering::render_path;

use crate::key::TypeKey;

/// Boxed error returned by user constructors and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Mawrid operations.
#[derive(Debug, thiserror::Error)]
pub enum MawridError {
    /// Requested service was never registered and could not be made implicitly.
    #[error("{}", .0)]
    NotRegistered(NotRegisteredError),

    /// Construction of a service failed.
    #[error("{}", .0)]
    Activation(ActivationError),

    /// A service depends on itself, directly or indirectly.
    #[error("{}", .0)]
    CyclicDependency(CyclicDependencyError),

    /// A user constructor or factory returned an error.
    #[error("Failed to construct {implementation}: {source}")]
    ConstructionFailed {
        implementation: TypeKey,
        #[source]
        source: BoxError,
    },

    /// A resolved value had a different type than the one asked for.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Service was already registered and overriding is disabled.
    #[error("{}", .0)]
    AlreadyRegistered(AlreadyRegisteredError),

    /// Registration attempted after the container was first used.
    #[error(
        "The container can't be changed after the first call to get_instance, get_all_instances or verify. \
         Registration of {service} was rejected"
    )]
    ContainerLocked { service: TypeKey },

    /// Decorator does not have the shape required to wrap the service.
    #[error("{decorator} is not a valid decorator for {service}: {reason}")]
    InvalidDecorator {
        service: TypeKey,
        decorator: TypeKey,
        reason: String,
    },

    /// Registration object belongs to another container.
    #[error(
        "The registration for {implementation} was created for a different container \
         and can't be used to register {service}"
    )]
    ForeignRegistration {
        service: TypeKey,
        implementation: TypeKey,
    },

    /// Diagnostics were requested before a successful verify().
    #[error("The container must be verified before it can be analyzed. Call verify() first")]
    NotVerified,
}

/// Broad classification of a [`MawridError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Activation,
    CyclicDependency,
    Configuration,
}

impl MawridError {
    /// Wraps an error raised by the constructor of `I`.
    pub fn construction<I: ?Sized + 'static>(source: impl Into<BoxError>) -> Self {
        MawridError::ConstructionFailed {
            implementation: TypeKey::of::<I>(),
            source: source.into(),
        }
    }

    /// Returns which family this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            MawridError::NotRegistered(_)
            | MawridError::Activation(_)
            | MawridError::ConstructionFailed { .. }
            | MawridError::TypeMismatch { .. } => ErrorCategory::Activation,
            MawridError::CyclicDependency(_) => ErrorCategory::CyclicDependency,
            MawridError::AlreadyRegistered(_)
            | MawridError::ContainerLocked { .. }
            | MawridError::InvalidDecorator { .. }
            | MawridError::ForeignRegistration { .. }
            | MawridError::NotVerified => ErrorCategory::Configuration,
        }
    }

    /// Returns the cycle path if this is a cyclic dependency error.
    pub fn cycle_path(&self) -> Option<&[TypeKey]> {
        match self {
            MawridError::CyclicDependency(e) => Some(&e.path),
            _ => None,
        }
    }

    pub(crate) fn activation(service: TypeKey, message: impl Into<String>) -> Self {
        MawridError::Activation(ActivationError::new(service, message))
    }
}

/// A service could not be found.
#[derive(Debug)]
pub struct NotRegisteredError {
    /// The service that was requested
    pub requested: TypeKey,
    /// The implementation that needed it, if known
    pub required_by: Option<TypeKey>,
    /// Registered services with similar names
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.required_by {
            Some(parent) => write!(
                f,
                "The constructor of type {} contains a parameter of type {} that is not registered",
                parent, self.requested
            )?,
            None => write!(f, "No registration for type {} could be found", self.requested)?,
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: register {} before the first call to get_instance",
            self.requested.short_name()
        )
    }
}

/// Construction of a service failed.
///
/// `path` starts at the outermost producer that saw the failure and ends at
/// the service named in `message`.
#[derive(Debug)]
pub struct ActivationError {
    pub service: TypeKey,
    pub message: String,
    pub path: Vec<TypeKey>,
}

impl ActivationError {
    pub fn new(service: TypeKey, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
            path: vec![service],
        }
    }
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if self.path.len() > 1 {
            let names: Vec<String> = self.path.iter().map(TypeKey::short_name).collect();
            write!(f, "\n  Resolution path: {}", render_path(&names))?;
        }
        Ok(())
    }
}

/// A cycle was found while building a construction plan.
///
/// `path` lists the services involved, outermost first, with the repeated
/// service at both ends. Example: `[A, B, A]`.
#[derive(Debug)]
pub struct CyclicDependencyError {
    pub path: Vec<TypeKey>,
}

impl fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.path.iter().map(TypeKey::short_name).collect();
        write!(
            f,
            "The configuration is invalid. {} is directly or indirectly depending on itself.\n  Cycle: {}",
            self.path.last().map(TypeKey::short_name).unwrap_or_default(),
            render_path(&names)
        )?;
        write!(
            f,
            "\n  Hint: break the cycle with a ServiceFactory<T> dependency or restructure the services"
        )
    }
}

/// A service was registered twice.
#[derive(Debug)]
pub struct AlreadyRegisteredError {
    pub service: TypeKey,
}

impl fmt::Display for AlreadyRegisteredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type {} has already been registered", self.service)?;
        write!(
            f,
            "\n  Hint: enable allow_overriding_registrations on the builder to replace it, \
             or use append_to_collection for multiple implementations"
        )
    }
}

/// Convenient Result type for Mawrid operations.
pub type Result<T> = std::result::Result<T, MawridError>;
