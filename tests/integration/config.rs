//! Rules file loading and resolution tests
//!
//! Exercises the public config surface: file loading, the JSON schema,
//! wildcard handling, and whole-file error collection.

use std::io::Write;
use std::net::Ipv4Addr;

use tempfile::NamedTempFile;

use udp_repeater::config::{load_rules, load_rules_str};
use udp_repeater::error::ConfigError;

const FULL_RULES: &str = r#"{
    "listen": [
        { "id": 1, "address": "*", "port": "8001" },
        { "id": 2, "address": "127.0.0.1", "port": "8002" }
    ],
    "transmit": [
        { "id": 1, "address": "*", "port": "*" },
        { "id": 2, "address": "127.0.0.1", "port": "6000" }
    ],
    "target": [
        { "id": 1, "address": "127.0.0.1", "port": "9000", "transmitter": 1 },
        { "id": 2, "address": "10.1.2.3", "port": "9001", "transmitter": 2 }
    ],
    "map": [
        { "source": 1, "target": [1, 2], "address": "*", "port": "*" },
        { "source": 2, "target": [1], "address": "192.168.0.1", "port": "4000" }
    ]
}"#;

#[test]
fn test_full_rules_file_resolution() {
    let rules = load_rules_str(FULL_RULES).expect("rules should resolve");

    assert_eq!(rules.listeners.len(), 2);
    assert_eq!(rules.transmitters.len(), 2);
    assert_eq!(rules.targets.len(), 2);
    // The first map entry has two target ids and expands to two rules.
    assert_eq!(rules.maps.len(), 3);

    assert_eq!(rules.listeners[0].address, Ipv4Addr::UNSPECIFIED);
    assert_eq!(rules.listeners[1].address, Ipv4Addr::LOCALHOST);

    assert_eq!(rules.transmitters[0].port, 0);
    assert_eq!(rules.transmitters[1].port, 6000);

    assert_eq!(rules.maps[0].target_id, 1);
    assert_eq!(rules.maps[1].target_id, 2);
    assert_eq!(rules.maps[0].listener_id, rules.maps[1].listener_id);
    assert_eq!(rules.maps[2].src_address, Ipv4Addr::new(192, 168, 0, 1));
    assert_eq!(rules.maps[2].src_port, 4000);
}

#[test]
fn test_load_rules_from_disk() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(FULL_RULES.as_bytes()).unwrap();

    let rules = load_rules(file.path()).expect("load failed");
    assert_eq!(rules.maps.len(), 3);
}

#[test]
fn test_missing_file() {
    let result = load_rules("/nonexistent/rules.json");
    assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
}

#[test]
fn test_malformed_json_is_parse_error() {
    let result = load_rules_str("{ \"listen\": [");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_wrong_field_type_is_parse_error() {
    // id must be a JSON integer, not a string.
    let json = r#"{
        "listen":   [ { "id": "1", "address": "*", "port": "8001" } ],
        "transmit": [], "target": [], "map": []
    }"#;
    assert!(matches!(
        load_rules_str(json),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_every_field_error_is_reported() {
    // Four independent problems across three sections; all must appear.
    let json = r#"{
        "listen":   [ { "id": 1, "address": "bogus", "port": "8001" } ],
        "transmit": [ { "id": 0, "address": "*", "port": "*" } ],
        "target":   [ { "id": 1, "address": "10.0.0.1", "port": "1024", "transmitter": 1 } ],
        "map":      [ { "source": 1, "target": [1], "address": "*" } ]
    }"#;

    let err = load_rules_str(json).unwrap_err();
    let diags = err.diagnostics();
    assert_eq!(diags.len(), 4);
    assert!(diags.iter().any(|d| d.contains("listen[0]->address")));
    assert!(diags.iter().any(|d| d.contains("transmit[0]->id")));
    assert!(diags.iter().any(|d| d.contains("target[0]->port")));
    assert!(diags.iter().any(|d| d.contains("map[0]->port not found")));
}

#[test]
fn test_port_boundaries() {
    let template = |port: &str| {
        format!(
            r#"{{
                "listen":   [ {{ "id": 1, "address": "*", "port": "{port}" }} ],
                "transmit": [], "target": [], "map": []
            }}"#
        )
    };

    assert!(load_rules_str(&template("1025")).is_ok());
    assert!(load_rules_str(&template("65535")).is_ok());
    assert!(load_rules_str(&template("1024")).is_err());
    assert!(load_rules_str(&template("65536")).is_err());
}

#[test]
fn test_empty_map_target_array_produces_no_rules() {
    let json = r#"{
        "listen":   [ { "id": 1, "address": "*", "port": "8001" } ],
        "transmit": [], "target": [],
        "map":      [ { "source": 1, "target": [], "address": "*", "port": "*" } ]
    }"#;

    let rules = load_rules_str(json).expect("resolve failed");
    assert!(rules.maps.is_empty());
}
