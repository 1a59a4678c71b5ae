//! Resolution engine for Mawrid DI.
//!
//! Registrations, lifestyles, construction plans, ambient scopes,
//! decorators and the diagnostics analyzer.

pub mod collection;
pub mod container;
mod cycle;
pub mod decorator;
pub mod diagnostics;
pub mod error;
pub mod generic;
pub mod injectable;
pub mod instance;
pub mod key;
pub mod lifestyle;
pub mod options;
pub mod plan;
pub mod producer;
pub mod registration;
pub mod relationship;
pub mod scope;
pub mod scope_manager;

pub use container::{Container, ContainerBuilder, WeakContainer, prelude};
pub use error::{MawridError, Result};
pub use key::TypeKey;
pub use lifestyle::Lifestyle;
