//! Error types for udp-repeater
//!
//! This module defines the error hierarchy for the repeater daemon. Errors
//! are categorized by subsystem: configuration, registry population, socket
//! setup, cross-reference validation, and the relay loop itself.
//!
//! Everything before the relay loop starts is fatal; once the loop is
//! running, per-packet errors are logged and the datagram is dropped.

use std::io;
use std::net::SocketAddrV4;

use thiserror::Error;

/// Top-level error type for udp-repeater
#[derive(Debug, Error)]
pub enum RepeaterError {
    /// Rules file errors (reading, parsing, field validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Registry population errors (invalid or duplicate entities)
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Socket creation, option, or bind errors
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// Cross-reference validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Relay loop errors
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from loading and resolving the rules file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Rules file not found or inaccessible
    #[error("Rules file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse rules file: {0}")]
    ParseError(String),

    /// Field-level errors collected across the whole file
    #[error("Rules rejected with {} error(s)", .errors.len())]
    Rejected { errors: Vec<String> },

    /// I/O error while reading the rules file
    #[error("I/O error reading rules file: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// The individual diagnostics carried by a `Rejected` error, one line
    /// per root cause. Empty for other variants.
    #[must_use]
    pub fn diagnostics(&self) -> &[String] {
        match self {
            Self::Rejected { errors } => errors,
            _ => &[],
        }
    }
}

/// Errors while populating the registry from resolved rules
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Entity id is zero
    #[error("You must define a positive ID for each {entity}")]
    InvalidId { entity: &'static str },

    /// Entity id already taken
    #[error("Duplicate {entity} ID: {id}")]
    DuplicateId { entity: &'static str, id: u32 },

    /// Listener or target without a port
    #[error("{entity} {id} must have a port defined")]
    MissingPort { entity: &'static str, id: u32 },

    /// Target with a wildcard destination address
    #[error("Target {id} must have an address defined")]
    MissingAddress { id: u32 },

    /// Target without a transmitter reference
    #[error("Target {id} must have a transmitter defined")]
    MissingTransmitter { id: u32 },

    /// Socket setup failed while creating the entity
    #[error(transparent)]
    Socket(#[from] SocketError),
}

impl RegistryError {
    /// Create an invalid-id error
    #[must_use]
    pub const fn invalid_id(entity: &'static str) -> Self {
        Self::InvalidId { entity }
    }

    /// Create a duplicate-id error
    #[must_use]
    pub const fn duplicate_id(entity: &'static str, id: u32) -> Self {
        Self::DuplicateId { entity, id }
    }
}

/// Socket creation, option, and bind errors
#[derive(Debug, Error)]
pub enum SocketError {
    /// Failed to create the UDP socket
    #[error("Failed to create UDP socket: {0}")]
    Creation(String),

    /// Failed to set a socket option
    #[error("Failed to set socket option {option}: {reason}")]
    Option { option: &'static str, reason: String },

    /// Failed to bind to an address
    #[error("Failed to bind to {addr}: {reason}")]
    Bind { addr: SocketAddrV4, reason: String },
}

impl SocketError {
    /// Create a socket option error
    pub fn option(option: &'static str, reason: impl Into<String>) -> Self {
        Self::Option {
            option,
            reason: reason.into(),
        }
    }

    /// Create a bind error
    pub fn bind(addr: SocketAddrV4, reason: impl Into<String>) -> Self {
        Self::Bind {
            addr,
            reason: reason.into(),
        }
    }
}

/// A single cross-reference violation found by the validator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// A map references a listener id that was never defined
    #[error("Listener {listener_id} referenced in map but not defined")]
    UndefinedListener { listener_id: u32 },

    /// A map references a target id that was never defined
    #[error("Target {target_id} referenced in map but not defined")]
    UndefinedTarget { target_id: u32 },

    /// A target references a transmitter id that was never defined
    #[error("Transmitter {transmitter_id} referenced in target but not defined")]
    UndefinedTransmitter { transmitter_id: u32 },

    /// A target is defined but no map routes to it
    #[error("Target {target_id} defined, but not used in any maps")]
    UnusedTarget { target_id: u32 },

    /// A transmitter is defined but no target sends through it
    #[error("Transmitter {transmitter_id} defined, but not used in any targets")]
    UnusedTransmitter { transmitter_id: u32 },
}

/// Cross-reference validation failed; carries every violation found
#[derive(Debug, Error)]
#[error("Config verification failed with {} violation(s)", .violations.len())]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    /// Wrap a non-empty list of violations
    #[must_use]
    pub fn new(violations: Vec<Violation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }

    /// The violations, in check order
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

/// Relay loop errors
///
/// All per-packet variants are logged and the loop continues; only
/// `LoopTerminated` is fatal.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to receive a datagram on a listener socket
    #[error("Couldn't receive packet on listener {listener_id}: {reason}")]
    Recv { listener_id: u32, reason: String },

    /// Failed to send a datagram to a target
    #[error("Failed to send packet to {dest}: {reason}")]
    Send { dest: SocketAddrV4, reason: String },

    /// A map named a target id missing from the registry
    #[error("Target {target_id} not found in registry")]
    UnknownTarget { target_id: u32 },

    /// A target named a transmitter id missing from the registry
    #[error("Transmitter {transmitter_id} not found in registry")]
    UnknownTransmitter { transmitter_id: u32 },

    /// A listener loop stopped; the daemon cannot continue
    #[error("Relay loop terminated unexpectedly: {0}")]
    LoopTerminated(String),
}

impl RelayError {
    /// Create a receive error
    pub fn recv(listener_id: u32, reason: impl Into<String>) -> Self {
        Self::Recv {
            listener_id,
            reason: reason.into(),
        }
    }

    /// Create a send error
    pub fn send(dest: SocketAddrV4, reason: impl Into<String>) -> Self {
        Self::Send {
            dest,
            reason: reason.into(),
        }
    }
}

/// Type alias for Result with `RepeaterError`
pub type Result<T> = std::result::Result<T, RepeaterError>;
