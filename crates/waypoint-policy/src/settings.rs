//! Engine settings loaded from TOML.
//!
//! Every `EngineConfig` field carries a serde default, so an empty document
//! yields the stock limits:
//!
//! ```toml
//! max_iterations_per_state = 10
//! max_total_iterations = 50
//! enable_policy_gate = true
//! history_window = 20
//! tool_description_max_len = 500
//!
//! [cost_per_token]
//! prompt = 0.000003
//! completion = 0.000015
//! ```

use std::path::Path;

use tracing::debug;

use waypoint_contracts::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
};

/// Parse `s` as TOML engine settings.
///
/// Returns `EngineError::ConfigError` if the TOML is malformed, does not
/// match `EngineConfig`, or sets a limit that would stop every run before
/// its first backend call.
pub fn load_engine_config_str(s: &str) -> EngineResult<EngineConfig> {
    let config: EngineConfig = toml::from_str(s).map_err(|e| EngineError::ConfigError {
        reason: format!("failed to parse engine settings TOML: {}", e),
    })?;

    if config.max_total_iterations == 0 {
        return Err(EngineError::ConfigError {
            reason: "max_total_iterations must be at least 1".to_string(),
        });
    }
    if config.max_iterations_per_state == 0 {
        return Err(EngineError::ConfigError {
            reason: "max_iterations_per_state must be at least 1".to_string(),
        });
    }

    debug!(
        max_iterations_per_state = config.max_iterations_per_state,
        max_total_iterations = config.max_total_iterations,
        enable_policy_gate = config.enable_policy_gate,
        "engine settings loaded"
    );
    Ok(config)
}

/// Read the file at `path` and parse it as TOML engine settings.
pub fn load_engine_config_file(path: &Path) -> EngineResult<EngineConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigError {
        reason: format!("failed to read engine settings '{}': {}", path.display(), e),
    })?;
    load_engine_config_str(&contents)
}
