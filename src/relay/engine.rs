//! Relay engine
//!
//! The engine owns every socket for the lifetime of the process and runs
//! one receive loop per listener. It is built for a current-thread tokio
//! runtime: the runtime's multiplexed wait is the only suspension point,
//! there is no parallelism, and each datagram's complete fan-out is awaited
//! before that listener receives again.
//!
//! Transmitter sockets are never polled for read. Unsolicited datagrams
//! arriving on an egress socket stay in the kernel receive queue and are
//! ignored by the daemon.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::dispatch::{dispatch, RouteTable, MAX_DATAGRAM_SIZE};
use crate::error::{RelayError, Result};
use crate::registry::Registry;

/// Relay counters, updated from the listener loops
#[derive(Debug, Default)]
pub struct RelayStats {
    datagrams_received: AtomicU64,
    datagrams_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
    recv_errors: AtomicU64,
    send_errors: AtomicU64,
    unmatched: AtomicU64,
}

impl RelayStats {
    pub(crate) fn record_received(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_forwarded(&self, bytes: usize) {
        self.datagrams_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_recv_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unmatched(&self) {
        self.unmatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters
    #[must_use]
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            datagrams_forwarded: self.datagrams_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Datagrams received on listener sockets
    pub datagrams_received: u64,
    /// Datagrams sent to targets (one per matched map)
    pub datagrams_forwarded: u64,
    /// Payload bytes sent to targets
    pub bytes_forwarded: u64,
    /// Receive failures (datagram dropped)
    pub recv_errors: u64,
    /// Send failures, short sends, and unresolvable ids
    pub send_errors: u64,
    /// Received datagrams that matched no map
    pub unmatched: u64,
}

/// One listener socket with its configured id
struct Ingress {
    listener_id: u32,
    socket: UdpSocket,
}

/// The forwarding engine
///
/// Consumes the validated [`Registry`]; the routing state is immutable from
/// here on.
pub struct Engine {
    ingress: Vec<Ingress>,
    route: Arc<RouteTable>,
    stats: Arc<RelayStats>,
}

impl Engine {
    /// Build the engine from a populated, validated registry.
    ///
    /// Converts every socket into a tokio socket, so this must be called
    /// from within a runtime.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if socket registration with the runtime fails.
    pub fn new(registry: Registry) -> Result<Self> {
        let Registry {
            listeners,
            transmitters,
            targets,
            maps,
        } = registry;

        let mut ingress = Vec::with_capacity(listeners.len());
        for listener in listeners {
            ingress.push(Ingress {
                listener_id: listener.id,
                socket: UdpSocket::from_std(listener.socket)?,
            });
        }

        let mut egress = HashMap::with_capacity(transmitters.len());
        for (id, transmitter) in transmitters {
            egress.insert(id, UdpSocket::from_std(transmitter.socket)?);
        }

        Ok(Self {
            ingress,
            route: Arc::new(RouteTable {
                transmitters: egress,
                targets,
                maps,
            }),
            stats: Arc::new(RelayStats::default()),
        })
    }

    /// Handle to the relay counters, valid after `run` consumes the engine
    #[must_use]
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Run the relay loops forever.
    ///
    /// Never returns under normal operation; per-packet errors are logged
    /// and the loops continue.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::LoopTerminated`] if a listener loop stops,
    /// which is fatal.
    pub async fn run(self) -> std::result::Result<(), RelayError> {
        info!(
            "Relay engine starting: {} listeners, {} transmitters, {} targets, {} maps",
            self.ingress.len(),
            self.route.transmitters.len(),
            self.route.targets.len(),
            self.route.maps.len()
        );

        let mut loops = JoinSet::new();
        for ingress in self.ingress {
            let route = Arc::clone(&self.route);
            let stats = Arc::clone(&self.stats);
            loops.spawn(listener_loop(ingress, route, stats));
        }

        // A configuration with no listeners has nothing to do but must keep
        // the daemon alive, matching a poll over an empty fd set.
        if loops.is_empty() {
            warn!("No listeners configured; daemon is idle");
            std::future::pending::<()>().await;
        }

        match loops.join_next().await {
            Some(Err(e)) => Err(RelayError::LoopTerminated(e.to_string())),
            Some(Ok(())) | None => Err(RelayError::LoopTerminated(
                "listener loop returned".to_string(),
            )),
        }
    }
}

/// Receive loop for one listener socket.
///
/// Reads one datagram at a time and dispatches its full fan-out before the
/// next receive. Receive errors are logged and the loop continues.
async fn listener_loop(ingress: Ingress, route: Arc<RouteTable>, stats: Arc<RelayStats>) {
    let Ingress {
        listener_id,
        socket,
    } = ingress;

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, SocketAddr::V4(src))) => {
                stats.record_received();
                debug!(
                    "Received packet on listener ID: {} from {}:{}",
                    listener_id,
                    src.ip(),
                    src.port()
                );
                dispatch(&route, &stats, listener_id, &buf[..len], src).await;
            }
            Ok((_, SocketAddr::V6(src))) => {
                // Sockets are AF_INET, so this cannot happen; drop it.
                warn!(
                    "Ignoring non-IPv4 packet on listener {} from {}",
                    listener_id, src
                );
            }
            Err(e) => {
                stats.record_recv_error();
                error!("{}", RelayError::recv(listener_id, e.to_string()));
            }
        }
    }
}
