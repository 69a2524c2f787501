//! Loading agent specifications from TOML.
//!
//! A document is parsed into a `Specification`, validated, and only then
//! handed to the engine. Warnings are logged; any error rejects the whole
//! document with `EngineError::InvalidSpecification`.

use std::path::Path;

use tracing::{info, warn};

use waypoint_contracts::{
    error::{EngineError, EngineResult},
    spec::Specification,
};

use crate::validator::SpecValidator;

/// Parse and validate `s` with the default (lenient) validator.
pub fn load_specification_str(s: &str) -> EngineResult<Specification> {
    load_specification_str_with(s, &SpecValidator::new())
}

/// Parse `s` as a TOML specification and validate it with `validator`.
///
/// Returns `EngineError::InvalidSpecification` if the TOML is malformed,
/// does not match the `Specification` schema, or fails validation.
pub fn load_specification_str_with(s: &str, validator: &SpecValidator) -> EngineResult<Specification> {
    let spec: Specification = toml::from_str(s).map_err(|e| EngineError::InvalidSpecification {
        reason: format!("failed to parse specification TOML: {}", e),
    })?;

    let outcome = validator.validate(&spec);
    for issue in outcome.warnings() {
        warn!(agent = %spec.agent.id, issue = %issue, "specification warning");
    }
    if !outcome.is_valid() {
        return Err(EngineError::InvalidSpecification {
            reason: outcome.error_summary(),
        });
    }

    info!(
        agent = %spec.agent.id,
        states = spec.states.len(),
        tools = spec.tools.len(),
        "specification loaded"
    );
    Ok(spec)
}

/// Read the file at `path` and load it with the default validator.
///
/// Returns `EngineError::ConfigError` if the file cannot be read.
pub fn load_specification_file(path: &Path) -> EngineResult<Specification> {
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigError {
        reason: format!("failed to read specification '{}': {}", path.display(), e),
    })?;
    load_specification_str(&contents)
}
