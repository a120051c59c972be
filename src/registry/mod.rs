//! Entity registry
//!
//! In-memory catalog of the configured entities: listeners, transmitters,
//! targets, and the ordered map list. The registry is populated by the
//! bootstrap through the `create_*` operations, checked once by
//! [`verify`], and then handed to the relay engine. Nothing mutates it
//! after that.
//!
//! Transmitter and target lookups are on the per-packet path, so both are
//! id-keyed hash maps; maps are a plain vector because matching walks every
//! map in insertion order anyway.

mod validate;

pub use validate::verify;

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use tracing::{debug, info};

use crate::config::Rules;
use crate::error::RegistryError;
use crate::socket;

/// A configured ingress endpoint and its bound socket
#[derive(Debug)]
pub struct Listener {
    /// Unique positive id
    pub id: u32,

    /// Bind address (unspecified = any interface)
    pub address: Ipv4Addr,

    /// Bind port (mandatory, 1025-65535)
    pub port: u16,

    pub(crate) socket: UdpSocket,
}

/// A configured egress socket
#[derive(Debug)]
pub struct Transmitter {
    /// Unique positive id
    pub id: u32,

    /// Bind address (unspecified = unbound/any)
    pub address: Ipv4Addr,

    /// Bind port (0 = ephemeral)
    pub port: u16,

    pub(crate) socket: UdpSocket,
}

/// A destination record selected by maps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Unique positive id
    pub id: u32,

    /// Destination address (non-zero)
    pub address: Ipv4Addr,

    /// Destination port (1025-65535)
    pub port: u16,

    /// Transmitter used to send to this destination
    pub transmitter_id: u32,
}

impl Target {
    /// Destination socket address
    #[must_use]
    pub const fn dest(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

/// A matching rule routing incoming datagrams to one target
///
/// Maps have no identity; identical maps are allowed and each produces its
/// own forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    /// Listener the datagram must have arrived on
    pub listener_id: u32,

    /// Required source address (unspecified = any)
    pub src_address: Ipv4Addr,

    /// Required source port (0 = any)
    pub src_port: u16,

    /// Target that receives the forwarded datagram
    pub target_id: u32,
}

impl Map {
    /// Whether a datagram received on `listener_id` from `src` matches.
    #[must_use]
    pub fn matches(&self, listener_id: u32, src: SocketAddrV4) -> bool {
        self.listener_id == listener_id
            && (self.src_address.is_unspecified() || self.src_address == *src.ip())
            && (self.src_port == 0 || self.src_port == src.port())
    }
}

/// Catalog of all configured entities
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) listeners: Vec<Listener>,
    pub(crate) transmitters: HashMap<u32, Transmitter>,
    pub(crate) targets: HashMap<u32, Target>,
    pub(crate) maps: Vec<Map>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate a registry from resolved rules, in rules-file order.
    ///
    /// # Errors
    ///
    /// Returns the first `RegistryError`; entity creation is fatal on any
    /// invalid value, duplicate id, or socket failure.
    pub fn from_rules(rules: &Rules) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for listener in &rules.listeners {
            registry.create_listener(listener.id, listener.address, listener.port)?;
        }
        for transmitter in &rules.transmitters {
            registry.create_transmitter(transmitter.id, transmitter.address, transmitter.port)?;
        }
        for target in &rules.targets {
            registry.create_target(target.id, target.address, target.port, target.transmitter_id)?;
        }
        for map in &rules.maps {
            registry.create_map(map.listener_id, map.src_address, map.src_port, map.target_id);
        }

        Ok(registry)
    }

    /// Create a listener and open its bound ingress socket.
    ///
    /// # Errors
    ///
    /// Fails on a zero id, zero port, duplicate id, or socket failure.
    pub fn create_listener(
        &mut self,
        id: u32,
        address: Ipv4Addr,
        port: u16,
    ) -> Result<(), RegistryError> {
        if id == 0 {
            return Err(RegistryError::invalid_id("listener"));
        }
        if port == 0 {
            return Err(RegistryError::MissingPort {
                entity: "Listener",
                id,
            });
        }
        if self.listeners.iter().any(|l| l.id == id) {
            return Err(RegistryError::duplicate_id("listener", id));
        }

        let sock = socket::open_udp_socket(address, port)?;
        log_recv_buffer(&sock, address, port);

        self.listeners.push(Listener {
            id,
            address,
            port,
            socket: sock,
        });
        Ok(())
    }

    /// Create a transmitter and open its egress socket.
    ///
    /// Address and port may both be zero, leaving the socket unbound until
    /// the first send.
    ///
    /// # Errors
    ///
    /// Fails on a zero id, duplicate id, or socket failure.
    pub fn create_transmitter(
        &mut self,
        id: u32,
        address: Ipv4Addr,
        port: u16,
    ) -> Result<(), RegistryError> {
        if id == 0 {
            return Err(RegistryError::invalid_id("transmitter"));
        }
        if self.transmitters.contains_key(&id) {
            return Err(RegistryError::duplicate_id("transmitter", id));
        }

        let sock = socket::open_udp_socket(address, port)?;
        socket::set_send_buffer(&sock)?;
        log_send_buffer(&sock, address, port);

        self.transmitters.insert(
            id,
            Transmitter {
                id,
                address,
                port,
                socket: sock,
            },
        );
        Ok(())
    }

    /// Create a target record.
    ///
    /// # Errors
    ///
    /// Fails on a zero id, duplicate id, wildcard address, zero port, or
    /// zero transmitter id.
    pub fn create_target(
        &mut self,
        id: u32,
        address: Ipv4Addr,
        port: u16,
        transmitter_id: u32,
    ) -> Result<(), RegistryError> {
        if id == 0 {
            return Err(RegistryError::invalid_id("target"));
        }
        if self.targets.contains_key(&id) {
            return Err(RegistryError::duplicate_id("target", id));
        }
        if address.is_unspecified() {
            return Err(RegistryError::MissingAddress { id });
        }
        if port == 0 {
            return Err(RegistryError::MissingPort {
                entity: "Target",
                id,
            });
        }
        if transmitter_id == 0 {
            return Err(RegistryError::MissingTransmitter { id });
        }

        self.targets.insert(
            id,
            Target {
                id,
                address,
                port,
                transmitter_id,
            },
        );
        Ok(())
    }

    /// Append a map to the ordered map list.
    ///
    /// No duplicate detection: identical maps produce duplicate forwards.
    pub fn create_map(
        &mut self,
        listener_id: u32,
        src_address: Ipv4Addr,
        src_port: u16,
        target_id: u32,
    ) {
        self.maps.push(Map {
            listener_id,
            src_address,
            src_port,
            target_id,
        });
    }

    /// Look up a transmitter by id
    #[must_use]
    pub fn transmitter(&self, id: u32) -> Option<&Transmitter> {
        self.transmitters.get(&id)
    }

    /// Look up a target by id
    #[must_use]
    pub fn target(&self, id: u32) -> Option<&Target> {
        self.targets.get(&id)
    }

    /// Whether a listener with this id exists
    #[must_use]
    pub fn has_listener(&self, id: u32) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }

    /// The configured listeners
    #[must_use]
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    /// The maps in insertion order
    #[must_use]
    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    /// Iterate over all targets
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Iterate over all transmitters
    pub fn transmitters(&self) -> impl Iterator<Item = &Transmitter> {
        self.transmitters.values()
    }

    /// Dump the configured entities to the log at debug level
    pub fn debug_dump(&self) {
        for listener in &self.listeners {
            debug!(
                "Listener {}: {}:{}",
                listener.id, listener.address, listener.port
            );
        }
        for transmitter in self.transmitters.values() {
            debug!(
                "Transmitter {}: {}:{}",
                transmitter.id, transmitter.address, transmitter.port
            );
        }
        for target in self.targets.values() {
            debug!(
                "Target {}: {}:{} via transmitter {}",
                target.id, target.address, target.port, target.transmitter_id
            );
        }
        for (i, map) in self.maps.iter().enumerate() {
            debug!(
                "Map {}: listener {} src {}:{} -> target {}",
                i + 1,
                map.listener_id,
                map.src_address,
                map.src_port,
                map.target_id
            );
        }
    }
}

fn log_recv_buffer(sock: &UdpSocket, address: Ipv4Addr, port: u16) {
    match socket::recv_buffer_size(sock) {
        Ok(size) => info!(
            "Listener socket ({}:{}) receive buffer size = {} bytes",
            address, port, size
        ),
        Err(e) => info!("Getting SO_RCVBUF failed: {}", e),
    }
}

fn log_send_buffer(sock: &UdpSocket, address: Ipv4Addr, port: u16) {
    match socket::send_buffer_size(sock) {
        Ok(size) => info!(
            "Transmitter socket ({}:{}) send buffer size = {} bytes",
            address, port, size
        ),
        Err(e) => info!("Getting SO_SNDBUF failed: {}", e),
    }
}
