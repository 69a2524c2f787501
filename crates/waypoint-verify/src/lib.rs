//! # waypoint-verify
//!
//! Specification loading and verification for the Waypoint runtime.
//!
//! This crate provides:
//!
//! 1. **Loading** ([`loader`]): TOML agent specifications are parsed and
//!    validated before they reach the engine.
//! 2. **Validation** ([`validator::SpecValidator`]): structural checks over
//!    states, transitions, triggers and the tool registry, collected in one
//!    pass as errors and warnings.
//! 3. **Argument verification** ([`arguments::SchemaArgumentVerifier`]):
//!    implements [`waypoint_core::traits::ArgumentVerifier`] by validating
//!    tool arguments against their JSON Schema with the `jsonschema` crate.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use waypoint_verify::{load_specification_file, SchemaArgumentVerifier};
//!
//! let spec = Arc::new(load_specification_file(Path::new("agents/triage.toml"))?);
//! let runtime = Runtime::new(spec, ...)?.with_verifier(Arc::new(SchemaArgumentVerifier::new()));
//! ```

pub mod arguments;
pub mod loader;
pub mod validator;

pub use arguments::SchemaArgumentVerifier;
pub use loader::{load_specification_file, load_specification_str, load_specification_str_with};
pub use validator::{Severity, SpecValidator, ValidationIssue, ValidationOutcome};

// ── Tests ─────────────────────────────────────────────────────────────────────
