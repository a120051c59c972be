//! Configuration module for udp-repeater
//!
//! This module provides the rules file schema, loading, and resolution into
//! the typed rules the registry consumes.
//!
//! # Example
//!
//! ```no_run
//! use udp_repeater::config::load_rules;
//!
//! let rules = load_rules("/etc/udp-repeater/rules.json").unwrap();
//! println!("{} maps configured", rules.maps.len());
//! ```

mod loader;
mod types;

pub use loader::{load_rules, load_rules_str};
pub use types::{
    ListenEntry, ListenerRule, MapEntry, MapRule, Rules, RulesFile, TargetEntry, TargetRule,
    TransmitEntry, TransmitterRule,
};
