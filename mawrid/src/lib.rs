//! # Mawrid: Dependency Injection Resolution Engine for Rust
//!
//! Register services against a [`Container`], resolve them by type, and let
//! lifestyles decide how long each instance lives. Scopes are ambient: begin
//! one and every scoped resolution on that thread (or inside
//! [`Container::flow`]) shares it until the guard drops.
//!
//! ```rust
//! use mawrid::prelude::*;
//!
//! struct Clock;
//! impl Injectable for Clock {
//!     fn construct(_: &mut Arguments) -> Result<Self> {
//!         Ok(Clock)
//!     }
//! }
//!
//! let container = Container::new();
//! container.register::<Clock, Clock>(Lifestyle::Singleton)?;
//! container.verify()?;
//! assert!(container.analyze()?.is_empty());
//! # Ok::<(), MawridError>(())
//! ```

pub use mawrid_container::*;
pub use mawrid_support::*;
