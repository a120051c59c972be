//! End-to-end forwarding tests
//!
//! Drives the full path over live localhost sockets: rules file →
//! registry → validation → relay engine → datagrams in and out.
//!
//! Each test uses its own listener port so the tests can run in parallel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use udp_repeater::config::load_rules_str;
use udp_repeater::registry::{verify, Registry};
use udp_repeater::relay::{Engine, RelayStats};

/// Bind an ephemeral receiver socket and return it with its port.
async fn ephemeral_receiver() -> (UdpSocket, u16) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = sock.local_addr().unwrap().port();
    (sock, port)
}

/// Build the registry from rules JSON, validate it, and start the engine.
fn start_engine(json: &str) -> (JoinHandle<Result<(), udp_repeater::RelayError>>, Arc<RelayStats>) {
    let rules = load_rules_str(json).expect("rules should resolve");
    let registry = Registry::from_rules(&rules).expect("registry population failed");
    verify(&registry).expect("validation failed");

    let engine = Engine::new(registry).expect("engine setup failed");
    let stats = engine.stats();
    (tokio::spawn(engine.run()), stats)
}

/// Receive one datagram with a timeout, returning payload and source.
async fn recv_one(sock: &UdpSocket) -> Option<(Vec<u8>, SocketAddr)> {
    let mut buf = [0u8; 65_507];
    match tokio::time::timeout(Duration::from_secs(1), sock.recv_from(&mut buf)).await {
        Ok(Ok((len, src))) => Some((buf[..len].to_vec(), src)),
        _ => None,
    }
}

#[tokio::test]
async fn e2e_single_forward() {
    let (receiver, dest_port) = ephemeral_receiver().await;

    let json = format!(
        r#"{{
            "listen":   [ {{ "id": 1, "address": "*", "port": "48601" }} ],
            "transmit": [ {{ "id": 1, "address": "*", "port": "*" }} ],
            "target":   [ {{ "id": 1, "address": "127.0.0.1", "port": "{dest_port}", "transmitter": 1 }} ],
            "map":      [ {{ "source": 1, "target": [1], "address": "*", "port": "*" }} ]
        }}"#
    );
    let (relay, stats) = start_engine(&json);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(b"1234ABCDEF", "127.0.0.1:48601").await.unwrap();

    let (payload, _) = recv_one(&receiver).await.expect("no datagram forwarded");
    assert_eq!(payload, b"1234ABCDEF");

    // Exactly one datagram: nothing further arrives.
    assert!(recv_one(&receiver).await.is_none());

    let snap = stats.snapshot();
    assert_eq!(snap.datagrams_received, 1);
    assert_eq!(snap.datagrams_forwarded, 1);

    relay.abort();
}

#[tokio::test]
async fn e2e_fan_out_to_two_targets() {
    let (receiver_a, port_a) = ephemeral_receiver().await;
    let (receiver_b, port_b) = ephemeral_receiver().await;

    // Transmitter 2 is bound so its source port is observable on receipt.
    let json = format!(
        r#"{{
            "listen":   [ {{ "id": 2, "address": "*", "port": "48611" }} ],
            "transmit": [
                {{ "id": 1, "address": "*", "port": "*" }},
                {{ "id": 2, "address": "127.0.0.1", "port": "48612" }}
            ],
            "target": [
                {{ "id": 2, "address": "127.0.0.1", "port": "{port_a}", "transmitter": 1 }},
                {{ "id": 3, "address": "127.0.0.1", "port": "{port_b}", "transmitter": 2 }}
            ],
            "map": [ {{ "source": 2, "target": [2, 3], "address": "*", "port": "*" }} ]
        }}"#
    );
    let (relay, stats) = start_engine(&json);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(b"ZYXW987654", "127.0.0.1:48611").await.unwrap();

    let (payload_a, _) = recv_one(&receiver_a).await.expect("target 2 got nothing");
    assert_eq!(payload_a, b"ZYXW987654");

    let (payload_b, src_b) = recv_one(&receiver_b).await.expect("target 3 got nothing");
    assert_eq!(payload_b, b"ZYXW987654");
    // The egress source port is the transmitter's bind.
    assert_eq!(src_b.port(), 48612);

    assert_eq!(stats.snapshot().datagrams_forwarded, 2);

    relay.abort();
}

#[tokio::test]
async fn e2e_source_port_filter() {
    let (receiver, dest_port) = ephemeral_receiver().await;

    let json = format!(
        r#"{{
            "listen":   [ {{ "id": 1, "address": "*", "port": "48621" }} ],
            "transmit": [ {{ "id": 1, "address": "*", "port": "*" }} ],
            "target":   [ {{ "id": 1, "address": "127.0.0.1", "port": "{dest_port}", "transmitter": 1 }} ],
            "map":      [ {{ "source": 1, "target": [1], "address": "*", "port": "48622" }} ]
        }}"#
    );
    let (relay, stats) = start_engine(&json);

    // Matching source port: delivered.
    let matching = UdpSocket::bind("127.0.0.1:48622").await.unwrap();
    matching.send_to(b"pass", "127.0.0.1:48621").await.unwrap();
    let (payload, _) = recv_one(&receiver).await.expect("filtered out wrongly");
    assert_eq!(payload, b"pass");

    // Different source port: dropped.
    let other = UdpSocket::bind("127.0.0.1:48623").await.unwrap();
    other.send_to(b"drop", "127.0.0.1:48621").await.unwrap();
    assert!(recv_one(&receiver).await.is_none());

    let snap = stats.snapshot();
    assert_eq!(snap.datagrams_received, 2);
    assert_eq!(snap.datagrams_forwarded, 1);
    assert_eq!(snap.unmatched, 1);

    relay.abort();
}

#[tokio::test]
async fn e2e_duplicate_map_forwards_twice() {
    let (receiver, dest_port) = ephemeral_receiver().await;

    let json = format!(
        r#"{{
            "listen":   [ {{ "id": 1, "address": "*", "port": "48631" }} ],
            "transmit": [ {{ "id": 1, "address": "*", "port": "*" }} ],
            "target":   [ {{ "id": 1, "address": "127.0.0.1", "port": "{dest_port}", "transmitter": 1 }} ],
            "map": [
                {{ "source": 1, "target": [1], "address": "*", "port": "*" }},
                {{ "source": 1, "target": [1], "address": "*", "port": "*" }}
            ]
        }}"#
    );
    let (relay, stats) = start_engine(&json);

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(b"again", "127.0.0.1:48631").await.unwrap();

    let (first, _) = recv_one(&receiver).await.expect("first copy missing");
    let (second, _) = recv_one(&receiver).await.expect("second copy missing");
    assert_eq!(first, b"again");
    assert_eq!(second, b"again");
    assert!(recv_one(&receiver).await.is_none());

    assert_eq!(stats.snapshot().datagrams_forwarded, 2);

    relay.abort();
}

#[tokio::test]
async fn e2e_payload_bytes_preserved() {
    let (receiver, dest_port) = ephemeral_receiver().await;

    let json = format!(
        r#"{{
            "listen":   [ {{ "id": 1, "address": "*", "port": "48641" }} ],
            "transmit": [ {{ "id": 1, "address": "*", "port": "*" }} ],
            "target":   [ {{ "id": 1, "address": "127.0.0.1", "port": "{dest_port}", "transmitter": 1 }} ],
            "map":      [ {{ "source": 1, "target": [1], "address": "*", "port": "*" }} ]
        }}"#
    );
    let (relay, _stats) = start_engine(&json);

    // Binary payload with every byte value, plus an empty datagram.
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sender.send_to(&payload, "127.0.0.1:48641").await.unwrap();

    let (received, _) = recv_one(&receiver).await.expect("payload missing");
    assert_eq!(received, payload);

    sender.send_to(&[], "127.0.0.1:48641").await.unwrap();
    let (empty, _) = recv_one(&receiver).await.expect("empty datagram missing");
    assert!(empty.is_empty());

    relay.abort();
}

#[test]
fn e2e_unknown_target_reference_refused() {
    let json = r#"{
        "listen":   [ { "id": 1, "address": "127.0.0.1", "port": "48651" } ],
        "transmit": [ { "id": 1, "address": "*", "port": "*" } ],
        "target":   [ { "id": 1, "address": "127.0.0.1", "port": "9000", "transmitter": 1 } ],
        "map":      [ { "source": 1, "target": [99], "address": "*", "port": "*" } ]
    }"#;

    let rules = load_rules_str(json).unwrap();
    let registry = Registry::from_rules(&rules).unwrap();
    let err = verify(&registry).unwrap_err();

    let diagnostics: Vec<String> = err.violations().iter().map(ToString::to_string).collect();
    assert!(diagnostics
        .iter()
        .any(|d| d == "Target 99 referenced in map but not defined"));
}

#[test]
fn e2e_unused_transmitter_refused() {
    let json = r#"{
        "listen":   [ { "id": 1, "address": "127.0.0.1", "port": "48652" } ],
        "transmit": [
            { "id": 1, "address": "*", "port": "*" },
            { "id": 7, "address": "*", "port": "*" }
        ],
        "target":   [ { "id": 1, "address": "127.0.0.1", "port": "9000", "transmitter": 1 } ],
        "map":      [ { "source": 1, "target": [1], "address": "*", "port": "*" } ]
    }"#;

    let rules = load_rules_str(json).unwrap();
    let registry = Registry::from_rules(&rules).unwrap();
    let err = verify(&registry).unwrap_err();

    let diagnostics: Vec<String> = err.violations().iter().map(ToString::to_string).collect();
    assert!(diagnostics
        .iter()
        .any(|d| d == "Transmitter 7 defined, but not used in any targets"));
}
