//! udp-repeater: configurable UDP packet repeater
//!
//! A long-running daemon that receives UDP datagrams on one or more bound
//! sockets, matches each datagram against forwarding rules keyed on
//! (listener, source address, source port), and retransmits the payload
//! unchanged to every matched destination.
//!
//! # Architecture
//!
//! ```text
//! rules.json ──► config ──► registry (create_* calls) ──► verify
//!                                                            │
//!                                                            ▼
//! Listener sockets ──► relay engine ──► maps ──► targets ──► transmitter sockets
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use udp_repeater::config::load_rules;
//! use udp_repeater::registry::{verify, Registry};
//! use udp_repeater::relay::Engine;
//!
//! # fn example() -> udp_repeater::Result<()> {
//! let rules = load_rules("/etc/udp-repeater/rules.json")?;
//! let registry = Registry::from_rules(&rules)?;
//! verify(&registry)?;
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_io()
//!     .build()?;
//! runtime.block_on(async {
//!     let engine = Engine::new(registry)?;
//!     engine.run().await?;
//!     Ok(())
//! })
//! # }
//! ```
//!
//! # Modules
//!
//! - [`config`]: rules file schema, loading, and resolution
//! - [`daemon`]: fork/detach and log redirection
//! - [`error`]: error types
//! - [`registry`]: entity catalog and cross-reference validation
//! - [`relay`]: the event loop and dispatch engine
//! - [`socket`]: UDP socket setup

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod daemon;
pub mod error;
pub mod registry;
pub mod relay;
pub mod socket;

// Re-export commonly used types at the crate root
pub use config::{
    load_rules, load_rules_str, ListenerRule, MapRule, Rules, RulesFile, TargetRule,
    TransmitterRule,
};
pub use error::{
    ConfigError, RegistryError, RelayError, RepeaterError, Result, SocketError, ValidationError,
    Violation,
};
pub use registry::{verify, Listener, Map, Registry, Target, Transmitter};
pub use relay::{Engine, RelayStats, RelayStatsSnapshot, MAX_DATAGRAM_SIZE};
pub use socket::{open_udp_socket, RECV_BUFFER_SIZE, SEND_BUFFER_SIZE};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
