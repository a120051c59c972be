//! Rules file loading
//!
//! Reads the JSON rules file from disk, parses it, and resolves it into
//! typed rules. Parse failures and field errors are kept distinct so the
//! front-end can report one parse diagnostic or the full list of field
//! diagnostics.

use std::path::Path;

use tracing::{debug, info};

use super::types::{Rules, RulesFile};
use crate::error::ConfigError;

/// Load and resolve a rules file.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if the path does not exist,
/// [`ConfigError::ParseError`] if the JSON is malformed, and
/// [`ConfigError::Rejected`] with every collected diagnostic if any field
/// is missing or invalid.
pub fn load_rules(path: impl AsRef<Path>) -> Result<Rules, ConfigError> {
    let path = path.as_ref();

    debug!("Loading rules from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;
    let rules = load_rules_str(&contents)?;

    info!(
        "Rules loaded: {} listeners, {} transmitters, {} targets, {} maps",
        rules.listeners.len(),
        rules.transmitters.len(),
        rules.targets.len(),
        rules.maps.len()
    );

    Ok(rules)
}

/// Load and resolve rules from a JSON string.
///
/// # Errors
///
/// Returns `ConfigError` if parsing or resolution fails.
pub fn load_rules_str(json: &str) -> Result<Rules, ConfigError> {
    let file: RulesFile =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    file.resolve()
}
