//! Cross-reference validation
//!
//! Run once, after the registry is populated and before the relay engine
//! starts. All checks run to completion so the operator sees every problem
//! at once; each violation is also logged as it is found.

use tracing::error;

use super::Registry;
use crate::error::{ValidationError, Violation};

/// Verify every cross-reference in the registry.
///
/// Checks, in order:
/// 1. every map's listener and target ids resolve to defined entities;
/// 2. every target's transmitter id resolves, and every target is used by
///    at least one map;
/// 3. every transmitter is used by at least one target.
///
/// Validation is read-only and idempotent: running it twice on the same
/// registry yields the same verdict.
///
/// # Errors
///
/// Returns a [`ValidationError`] carrying every violation found.
pub fn verify(registry: &Registry) -> Result<(), ValidationError> {
    let mut violations = Vec::new();

    for map in registry.maps() {
        if registry.target(map.target_id).is_none() {
            violations.push(Violation::UndefinedTarget {
                target_id: map.target_id,
            });
        }
        if !registry.has_listener(map.listener_id) {
            violations.push(Violation::UndefinedListener {
                listener_id: map.listener_id,
            });
        }
    }

    for target in registry.targets() {
        if registry.transmitter(target.transmitter_id).is_none() {
            violations.push(Violation::UndefinedTransmitter {
                transmitter_id: target.transmitter_id,
            });
        }
        if !registry.maps().iter().any(|m| m.target_id == target.id) {
            violations.push(Violation::UnusedTarget {
                target_id: target.id,
            });
        }
    }

    for transmitter in registry.transmitters() {
        if !registry.targets().any(|t| t.transmitter_id == transmitter.id) {
            violations.push(Violation::UnusedTransmitter {
                transmitter_id: transmitter.id,
            });
        }
    }

    for violation in &violations {
        error!("CONFIG: {}", violation);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(violations))
    }
}
