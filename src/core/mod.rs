//! core
//!
//! Domain layer: validated types and configuration.
//!
//! Nothing in this module touches `git2`; the git layer converts at its
//! boundary. This keeps validation independently testable and prevents raw
//! strings from leaking into the object-model code.

pub mod config;
pub mod types;
