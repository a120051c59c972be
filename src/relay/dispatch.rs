//! Datagram dispatch
//!
//! Matches one received datagram against every map in insertion order and
//! sends the payload verbatim to each matched target through the target's
//! transmitter. A failure on one target never aborts dispatch to the rest.

use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};

use tokio::net::UdpSocket;
use tracing::{debug, error, trace};

use super::engine::RelayStats;
use crate::error::RelayError;
use crate::registry::{Map, Target};

/// Size of the receive buffer: the largest possible UDP/IPv4 payload
/// (65535 - 20 byte IP header - 8 byte UDP header).
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Immutable routing state shared by all listener loops
pub(crate) struct RouteTable {
    pub(crate) transmitters: HashMap<u32, UdpSocket>,
    pub(crate) targets: HashMap<u32, Target>,
    pub(crate) maps: Vec<Map>,
}

/// Fan a received datagram out to every matching map's target.
///
/// Sends happen synchronously, in map insertion order; duplicate maps each
/// produce their own send.
pub(crate) async fn dispatch(
    route: &RouteTable,
    stats: &RelayStats,
    listener_id: u32,
    payload: &[u8],
    src: SocketAddrV4,
) {
    let mut matched = false;

    for map in &route.maps {
        if !map.matches(listener_id, src) {
            continue;
        }
        matched = true;
        match forward(route, map.target_id, payload).await {
            Ok(sent) => stats.record_forwarded(sent),
            Err(e) => {
                stats.record_send_error();
                error!("{}", e);
            }
        }
    }

    if !matched {
        stats.record_unmatched();
        trace!(
            "No map matched packet on listener {} from {}",
            listener_id,
            src
        );
    }
}

/// Send the payload to a single target through its transmitter.
///
/// Returns the number of bytes sent.
async fn forward(
    route: &RouteTable,
    target_id: u32,
    payload: &[u8],
) -> Result<usize, RelayError> {
    // The validator guarantees these resolve for any configuration that was
    // allowed to start; a miss here drops only this datagram.
    let target = route
        .targets
        .get(&target_id)
        .ok_or(RelayError::UnknownTarget { target_id })?;
    let transmitter = route
        .transmitters
        .get(&target.transmitter_id)
        .ok_or(RelayError::UnknownTransmitter {
            transmitter_id: target.transmitter_id,
        })?;

    let dest = target.dest();
    let sent = transmitter
        .send_to(payload, SocketAddr::V4(dest))
        .await
        .map_err(|e| RelayError::send(dest, e.to_string()))?;

    if sent != payload.len() {
        return Err(RelayError::send(
            dest,
            format!("short send, {} of {} bytes", sent, payload.len()),
        ));
    }

    debug!("Sent packet to {}", dest);
    Ok(sent)
}
