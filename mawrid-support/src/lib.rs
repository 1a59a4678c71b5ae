//! # Mawrid Support
//!
//! Shared helpers for the Mawrid DI engine:
//! - Text rendering for error messages and diagnostic descriptions

pub mod rendering;
