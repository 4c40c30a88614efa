// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Registry lifecycle semantics: naming, reuse, options, teardown

use sockmux::prelude::*;
use std::time::Duration;

fn manager() -> SocketManager {
    SocketManager::new(zmq::Context::new(), RegistryConfig::default())
}

#[test]
fn test_create_is_idempotent_for_same_kind() {
    let sockets = manager();

    let first = sockets.create("pipe-in", SocketKind::Pull).unwrap();
    let second = sockets.create("pipe-in", SocketKind::Pull).unwrap();

    assert_eq!(first, second);
    assert_eq!(sockets.len(), 1);
}

#[test]
fn test_create_conflicting_kind_fails() {
    let sockets = manager();
    sockets.create("pipe-in", SocketKind::Pull).unwrap();

    let result = sockets.create("pipe-in", SocketKind::Publish);
    assert!(matches!(
        result,
        Err(SocketError::AlreadyExists { ref name, existing })
            if name == "pipe-in" && existing == SocketKind::Pull
    ));
}

#[test]
fn test_get_unknown_name_fails() {
    let sockets = manager();
    assert!(matches!(
        sockets.get("nowhere"),
        Err(SocketError::NotFound(_))
    ));
}

#[test]
fn test_get_or_create_returns_existing() {
    let sockets = manager();
    let created = sockets.create("api", SocketKind::Reply).unwrap();
    let fetched = sockets.get_or_create("api", SocketKind::Reply).unwrap();
    assert_eq!(created, fetched);
}

#[test]
fn test_bind_returns_resolved_ephemeral_port() {
    let sockets = manager();
    sockets.create("api", SocketKind::Reply).unwrap();

    let address = sockets.bind("api", "tcp://127.0.0.1:0").unwrap();
    assert!(address.starts_with("tcp://127.0.0.1:"));
    assert!(!address.ends_with(":0"));

    let endpoint = sockets.get("api").unwrap();
    assert_eq!(endpoint.role(), Some(SocketRole::Bound));
    assert_eq!(endpoint.addresses(), vec![address]);
}

#[test]
fn test_bind_to_random_port() {
    let sockets = manager();
    sockets.create("api", SocketKind::Reply).unwrap();

    let address = sockets.bind_to_random_port("api").unwrap();
    assert!(address.starts_with("tcp://0.0.0.0:"));
    assert!(!address.ends_with(":0"));
}

#[test]
fn test_bind_rejects_malformed_address() {
    let sockets = manager();
    sockets.create("api", SocketKind::Reply).unwrap();
    assert!(matches!(
        sockets.bind("api", "udp://127.0.0.1:5555"),
        Err(SocketError::InvalidAddress { .. })
    ));
}

#[test]
fn test_bind_port_in_use_fails_without_retry() {
    let sockets = manager();
    sockets.create("first", SocketKind::Pull).unwrap();
    let address = sockets.bind("first", "tcp://127.0.0.1:0").unwrap();

    // explicit port that is now taken: no silent retry to another port
    sockets.create("second", SocketKind::Pull).unwrap();
    assert!(matches!(
        sockets.bind("second", &address),
        Err(SocketError::BindError { .. })
    ));
}

#[test]
fn test_bind_and_connect_are_mutually_exclusive() {
    let sockets = manager();

    sockets.create("server", SocketKind::Reply).unwrap();
    let address = sockets.bind("server", "tcp://127.0.0.1:0").unwrap();
    assert!(matches!(
        sockets.connect("server", &address),
        Err(SocketError::ConnectError { .. })
    ));

    sockets.create("client", SocketKind::Request).unwrap();
    sockets.connect("client", &address).unwrap();
    assert!(matches!(
        sockets.bind("client", "tcp://127.0.0.1:0"),
        Err(SocketError::BindError { .. })
    ));
}

#[test]
fn test_ensure_and_bind_tolerates_existing_binding() {
    let sockets = manager();

    let first = sockets
        .ensure_and_bind("api", SocketKind::Reply, "tcp://127.0.0.1:0")
        .unwrap();
    // a second ephemeral request is satisfied by the existing binding
    let second = sockets
        .ensure_and_bind("api", SocketKind::Reply, "tcp://127.0.0.1:0")
        .unwrap();
    assert_eq!(first, second);

    // binding the exact resolved address again is success, not EADDRINUSE
    let third = sockets
        .ensure_and_bind("api", SocketKind::Reply, &first)
        .unwrap();
    assert_eq!(first, third);
    assert_eq!(sockets.get("api").unwrap().addresses().len(), 1);
}

#[test]
fn test_ensure_and_connect_tolerates_existing_connection() {
    let sockets = manager();
    let address = sockets
        .ensure_and_bind("server", SocketKind::Reply, "tcp://127.0.0.1:0")
        .unwrap();

    let first = sockets
        .ensure_and_connect("client", SocketKind::Request, &address)
        .unwrap();
    let second = sockets
        .ensure_and_connect("client", SocketKind::Request, &address)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(sockets.get("client").unwrap().addresses().len(), 1);
}

#[test]
fn test_socket_options_before_and_after_open() {
    let sockets = manager();
    sockets.create("pipe-out", SocketKind::Push).unwrap();

    sockets
        .set_socket_option("pipe-out", SocketOption::Identity(b"worker-1".to_vec()))
        .unwrap();
    sockets
        .set_socket_option("pipe-out", SocketOption::SendHighWaterMark(10))
        .unwrap();

    sockets.bind("pipe-out", "tcp://127.0.0.1:0").unwrap();

    // linger may change at any time; identity may not once open
    sockets
        .set_socket_option("pipe-out", SocketOption::Linger(Some(Duration::ZERO)))
        .unwrap();
    assert!(matches!(
        sockets.set_socket_option("pipe-out", SocketOption::Identity(b"worker-2".to_vec())),
        Err(SocketError::InvalidOption { .. })
    ));
}

#[test]
fn test_subscribe_requires_subscribe_kind() {
    let sockets = manager();
    sockets.create("pipe-in", SocketKind::Pull).unwrap();
    assert!(matches!(
        sockets.subscribe("pipe-in", "logs"),
        Err(SocketError::InvalidOperation { .. })
    ));
}

#[test]
fn test_resubscribe_replaces_filter() {
    let sockets = manager();
    sockets.create("events", SocketKind::Subscribe).unwrap();

    sockets.set_topic("events", "orders").unwrap();
    assert_eq!(
        sockets.get("events").unwrap().topic(),
        Some(b"orders".to_vec())
    );

    sockets.set_topic("events", "invoices").unwrap();
    assert_eq!(
        sockets.get("events").unwrap().topic(),
        Some(b"invoices".to_vec())
    );
}

#[test]
fn test_send_requires_an_open_address() {
    let sockets = manager();
    sockets.create("pipe-out", SocketKind::Push).unwrap();
    assert!(matches!(
        sockets.send_safe("pipe-out", &serde_json::json!(1), Some(Duration::ZERO)),
        Err(SocketError::InvalidOperation { .. })
    ));
}

#[test]
fn test_close_is_idempotent() {
    let sockets = manager();
    sockets.create("api", SocketKind::Reply).unwrap();

    sockets.close("api").unwrap();
    sockets.close("api").unwrap();
    sockets.close("never-existed").unwrap();

    assert!(matches!(sockets.get("api"), Err(SocketError::NotFound(_))));
}

#[test]
fn test_close_all_releases_everything() {
    let sockets = manager();
    sockets.create("a", SocketKind::Pull).unwrap();
    sockets.create("b", SocketKind::Push).unwrap();
    sockets.create("c", SocketKind::Publish).unwrap();
    assert_eq!(sockets.len(), 3);

    sockets.close_all().unwrap();
    assert!(sockets.is_empty());
    // safe to call again on an empty registry
    sockets.close_all().unwrap();
}

#[test]
fn test_disconnect_keeps_the_endpoint() {
    let sockets = manager();
    let address = sockets
        .ensure_and_bind("server", SocketKind::Reply, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .ensure_and_connect("client", SocketKind::Request, &address)
        .unwrap();

    assert!(sockets.disconnect("client").unwrap());
    assert!(sockets.get("client").unwrap().addresses().is_empty());
    // second disconnect has nothing left to drop
    assert!(!sockets.disconnect("client").unwrap());

    // disconnect is connect-side; a bound endpoint is released via close
    assert!(matches!(
        sockets.disconnect("server"),
        Err(SocketError::InvalidOperation { .. })
    ));
}

#[test]
fn test_poll_with_nothing_registered_is_empty() {
    let sockets = manager();
    assert!(sockets.poll(Some(Duration::ZERO)).unwrap().is_empty());
}

#[test]
fn test_debug_lists_socket_names() {
    let sockets = manager();
    sockets.create("foobar", SocketKind::Pull).unwrap();
    sockets.create("awesome", SocketKind::Push).unwrap();

    let repr = format!("{sockets:?}");
    assert!(repr.contains("foobar"));
    assert!(repr.contains("awesome"));
}
