//! Rules file schema and resolution
//!
//! The rules file is a JSON document with four mandatory top-level arrays:
//! `listen`, `transmit`, `target`, and `map`. Addresses are dotted-quad
//! strings (`"*"` for wildcard where allowed) and ports are strings so the
//! wildcard can be expressed uniformly.
//!
//! Deserialization is deliberately loose (every field is optional) so that
//! resolution can walk the whole file and report every error at once
//! instead of stopping at the first one. Field names are matched exactly;
//! unknown fields are rejected.
//!
//! ```json
//! {
//!     "listen":   [ { "id": 1, "address": "*", "port": "8001" } ],
//!     "transmit": [ { "id": 1, "address": "*", "port": "*" } ],
//!     "target":   [ { "id": 1, "address": "127.0.0.1", "port": "9000", "transmitter": 1 } ],
//!     "map":      [ { "source": 1, "target": [1], "address": "*", "port": "*" } ]
//! }
//! ```

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::error::ConfigError;

/// Lowest bindable/targetable port; everything at or below is rejected
const PORT_MIN: i64 = 1025;

/// Highest valid port
const PORT_MAX: i64 = 65_535;

/// Raw rules file as deserialized, before resolution
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesFile {
    /// `listen` array
    pub listen: Option<Vec<ListenEntry>>,

    /// `transmit` array
    pub transmit: Option<Vec<TransmitEntry>>,

    /// `target` array
    pub target: Option<Vec<TargetEntry>>,

    /// `map` array
    pub map: Option<Vec<MapEntry>>,
}

/// Raw `listen` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenEntry {
    pub id: Option<i64>,
    pub address: Option<String>,
    pub port: Option<String>,
}

/// Raw `transmit` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransmitEntry {
    pub id: Option<i64>,
    pub address: Option<String>,
    pub port: Option<String>,
}

/// Raw `target` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    pub id: Option<i64>,
    pub address: Option<String>,
    pub port: Option<String>,
    pub transmitter: Option<i64>,
}

/// Raw `map` entry
///
/// `target` is an array of target ids; the entry expands to one map rule
/// per id, all sharing the same source filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapEntry {
    pub source: Option<i64>,
    pub target: Option<Vec<i64>>,
    pub address: Option<String>,
    pub port: Option<String>,
}

/// Resolved listener rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRule {
    pub id: u32,
    pub address: Ipv4Addr,
    pub port: u16,
}

/// Resolved transmitter rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitterRule {
    pub id: u32,
    pub address: Ipv4Addr,
    pub port: u16,
}

/// Resolved target rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRule {
    pub id: u32,
    pub address: Ipv4Addr,
    pub port: u16,
    pub transmitter_id: u32,
}

/// Resolved map rule (one per target id in the raw entry)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapRule {
    pub listener_id: u32,
    pub src_address: Ipv4Addr,
    pub src_port: u16,
    pub target_id: u32,
}

/// Fully resolved rules, ready to populate a registry
#[derive(Debug, Clone, Default)]
pub struct Rules {
    pub listeners: Vec<ListenerRule>,
    pub transmitters: Vec<TransmitterRule>,
    pub targets: Vec<TargetRule>,
    pub maps: Vec<MapRule>,
}

impl RulesFile {
    /// Resolve the raw file into typed rules.
    ///
    /// Walks every entry and collects every error found before failing, so
    /// the operator sees the full list at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Rejected`] carrying one diagnostic per
    /// problem if anything in the file is missing or invalid.
    pub fn resolve(&self) -> Result<Rules, ConfigError> {
        let mut errors = Vec::new();
        let mut rules = Rules::default();

        match &self.listen {
            None => errors.push("listen config not found".to_string()),
            Some(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if let Some(rule) = entry.resolve(i, &mut errors) {
                        rules.listeners.push(rule);
                    }
                }
            }
        }

        match &self.transmit {
            None => errors.push("transmit config not found".to_string()),
            Some(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if let Some(rule) = entry.resolve(i, &mut errors) {
                        rules.transmitters.push(rule);
                    }
                }
            }
        }

        match &self.target {
            None => errors.push("target config not found".to_string()),
            Some(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    if let Some(rule) = entry.resolve(i, &mut errors) {
                        rules.targets.push(rule);
                    }
                }
            }
        }

        match &self.map {
            None => errors.push("map config not found".to_string()),
            Some(entries) => {
                for (i, entry) in entries.iter().enumerate() {
                    entry.resolve(i, &mut rules.maps, &mut errors);
                }
            }
        }

        if errors.is_empty() {
            Ok(rules)
        } else {
            Err(ConfigError::Rejected { errors })
        }
    }
}

impl ListenEntry {
    fn resolve(&self, index: usize, errors: &mut Vec<String>) -> Option<ListenerRule> {
        let before = errors.len();

        let id = resolve_id(&format!("listen[{index}]->id"), self.id, errors);
        let address = resolve_address(
            &format!("listen[{index}]->address"),
            self.address.as_deref(),
            Wildcard::Allowed,
            errors,
        );
        let port = resolve_port(
            &format!("listen[{index}]->port"),
            self.port.as_deref(),
            Wildcard::Rejected,
            errors,
        );

        if errors.len() > before {
            return None;
        }
        Some(ListenerRule {
            id: id?,
            address: address?,
            port: port?,
        })
    }
}

impl TransmitEntry {
    fn resolve(&self, index: usize, errors: &mut Vec<String>) -> Option<TransmitterRule> {
        let before = errors.len();

        let id = resolve_id(&format!("transmit[{index}]->id"), self.id, errors);
        let address = resolve_address(
            &format!("transmit[{index}]->address"),
            self.address.as_deref(),
            Wildcard::Allowed,
            errors,
        );
        let port = resolve_port(
            &format!("transmit[{index}]->port"),
            self.port.as_deref(),
            Wildcard::Allowed,
            errors,
        );

        if errors.len() > before {
            return None;
        }
        Some(TransmitterRule {
            id: id?,
            address: address?,
            port: port?,
        })
    }
}

impl TargetEntry {
    fn resolve(&self, index: usize, errors: &mut Vec<String>) -> Option<TargetRule> {
        let before = errors.len();

        let id = resolve_id(&format!("target[{index}]->id"), self.id, errors);
        // A target destination is mandatory, so "*" is not an address here.
        let address = resolve_address(
            &format!("target[{index}]->address"),
            self.address.as_deref(),
            Wildcard::Rejected,
            errors,
        );
        let port = resolve_port(
            &format!("target[{index}]->port"),
            self.port.as_deref(),
            Wildcard::Rejected,
            errors,
        );
        let transmitter_id = resolve_id(
            &format!("target[{index}]->transmitter"),
            self.transmitter,
            errors,
        );

        if errors.len() > before {
            return None;
        }
        Some(TargetRule {
            id: id?,
            address: address?,
            port: port?,
            transmitter_id: transmitter_id?,
        })
    }
}

impl MapEntry {
    fn resolve(&self, index: usize, maps: &mut Vec<MapRule>, errors: &mut Vec<String>) {
        let before = errors.len();

        let listener_id = resolve_id(&format!("map[{index}]->source"), self.source, errors);
        let src_address = resolve_address(
            &format!("map[{index}]->address"),
            self.address.as_deref(),
            Wildcard::Allowed,
            errors,
        );
        let src_port = resolve_port(
            &format!("map[{index}]->port"),
            self.port.as_deref(),
            Wildcard::Allowed,
            errors,
        );

        let target_ids = match &self.target {
            None => {
                errors.push(format!("map[{index}]->target not found"));
                return;
            }
            Some(ids) => ids,
        };

        let mut resolved_ids = Vec::with_capacity(target_ids.len());
        for raw in target_ids {
            match u32::try_from(*raw) {
                Ok(id) if id > 0 => resolved_ids.push(id),
                _ => errors.push(format!(
                    "map[{index}]->target must be an array of positive integers"
                )),
            }
        }

        if errors.len() > before {
            return;
        }

        // One map rule per target id, in array order, sharing the filter.
        let (listener_id, src_address, src_port) = match (listener_id, src_address, src_port) {
            (Some(l), Some(a), Some(p)) => (l, a, p),
            _ => return,
        };
        for target_id in resolved_ids {
            maps.push(MapRule {
                listener_id,
                src_address,
                src_port,
                target_id,
            });
        }
    }
}

/// Whether a field accepts the `"*"` wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wildcard {
    Allowed,
    Rejected,
}

fn resolve_id(field: &str, value: Option<i64>, errors: &mut Vec<String>) -> Option<u32> {
    match value {
        None => {
            errors.push(format!("{field} not found"));
            None
        }
        Some(raw) => match u32::try_from(raw) {
            Ok(id) if id > 0 => Some(id),
            _ => {
                errors.push(format!("{field} must be a positive integer"));
                None
            }
        },
    }
}

fn resolve_address(
    field: &str,
    value: Option<&str>,
    wildcard: Wildcard,
    errors: &mut Vec<String>,
) -> Option<Ipv4Addr> {
    let raw = match value {
        None => {
            errors.push(format!("{field} not found"));
            return None;
        }
        Some(raw) => raw,
    };

    if raw == "*" && wildcard == Wildcard::Allowed {
        return Some(Ipv4Addr::UNSPECIFIED);
    }

    match raw.parse::<Ipv4Addr>() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(format!("{field} is not a valid IPv4 address"));
            None
        }
    }
}

fn resolve_port(
    field: &str,
    value: Option<&str>,
    wildcard: Wildcard,
    errors: &mut Vec<String>,
) -> Option<u16> {
    let raw = match value {
        None => {
            errors.push(format!("{field} not found"));
            return None;
        }
        Some(raw) => raw,
    };

    if raw == "*" && wildcard == Wildcard::Allowed {
        return Some(0);
    }

    match raw.parse::<i64>() {
        Ok(port) if (PORT_MIN..=PORT_MAX).contains(&port) => u16::try_from(port).ok(),
        Ok(port) => {
            errors.push(format!(
                "{field}: {port} is an invalid port, must be {PORT_MIN}-{PORT_MAX}"
            ));
            None
        }
        Err(_) => {
            errors.push(format!("{field} must be a string port number"));
            None
        }
    }
}
