// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for live socket pairs over loopback TCP

use serde_json::json;
use sockmux::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn manager() -> SocketManager {
    let config = RegistryConfig::default().with_poll_interval(Duration::from_millis(100));
    SocketManager::new(zmq::Context::new(), config)
}

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

#[test]
fn test_request_reply_roundtrip() {
    let sockets = manager();

    let address = sockets
        .ensure_and_bind("replier", SocketKind::Reply, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .ensure_and_connect("requester", SocketKind::Request, &address)
        .unwrap();

    // request side: send_safe waits for the connection to come up
    assert!(sockets
        .send_safe("requester", &json!({"action": "ATTACK"}), TIMEOUT)
        .unwrap());

    let request = sockets.recv_safe("replier", TIMEOUT).unwrap();
    assert_eq!(request, Some(json!({"action": "ATTACK"})));

    assert!(sockets
        .send_safe("replier", &json!({"status": "engaged"}), TIMEOUT)
        .unwrap());

    let reply = sockets.recv_safe("requester", TIMEOUT).unwrap();
    assert_eq!(reply, Some(json!({"status": "engaged"})));
}

#[test]
fn test_push_pull_pipeline() {
    let sockets = manager();

    let address = sockets
        .ensure_and_bind("pipe-in", SocketKind::Pull, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .ensure_and_connect("pipe-out", SocketKind::Push, &address)
        .unwrap();

    for i in 0..3 {
        assert!(sockets
            .send_safe("pipe-out", &json!({"job": i}), TIMEOUT)
            .unwrap());
    }

    // per-endpoint ordering is preserved
    for i in 0..3 {
        let job = sockets.recv_safe("pipe-in", TIMEOUT).unwrap();
        assert_eq!(job, Some(json!({"job": i})));
    }
}

#[test]
fn test_pub_sub_prefix_filter_matches() {
    let sockets = manager();

    let address = sockets
        .ensure_and_bind("feed", SocketKind::Publish, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .ensure_and_connect("events", SocketKind::Subscribe, &address)
        .unwrap();
    sockets.subscribe("events", "orders").unwrap();

    // republish until the slow-joining subscriber is wired up
    let mut received = None;
    for _ in 0..50 {
        sockets
            .publish_safe("feed", "orders.created", &json!({"id": 7}))
            .unwrap();
        if let Some(event) = sockets
            .recv_event_safe("events", Some(Duration::from_millis(100)))
            .unwrap()
        {
            received = Some(event);
            break;
        }
    }

    let event = received.expect("subscriber never received a matching event");
    assert_eq!(event.topic(), "orders.created");
    assert_eq!(event.payload(), &json!({"id": 7}));
    assert!(!event.raw().is_empty());
}

#[test]
fn test_pub_sub_filter_excludes_shorter_topic() {
    let sockets = manager();

    let address = sockets
        .ensure_and_bind("feed", SocketKind::Publish, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .ensure_and_connect("events", SocketKind::Subscribe, &address)
        .unwrap();
    // "orders" is not prefixed by "orders.created" and must not match
    sockets.subscribe("events", "orders.created").unwrap();

    thread::sleep(Duration::from_millis(200));
    for _ in 0..10 {
        sockets
            .publish_safe("feed", "orders", &json!({"id": 1}))
            .unwrap();
    }

    let event = sockets
        .recv_event_safe("events", Some(Duration::from_millis(300)))
        .unwrap();
    assert!(event.is_none());
}

#[test]
fn test_publish_without_subscribers_is_fire_and_forget() {
    let sockets = manager();
    sockets
        .ensure_and_bind("feed", SocketKind::Publish, "tcp://127.0.0.1:0")
        .unwrap();

    let sent = sockets
        .publish_safe("feed", "log", &json!({"payload": "hello"}))
        .unwrap();
    assert!(sent);
}

#[test]
fn test_send_safe_returns_false_when_nothing_can_buffer() {
    let sockets = manager();
    // a bound PUSH with no PULL peers cannot buffer anything
    sockets
        .ensure_and_bind("pipe-out", SocketKind::Push, "tcp://127.0.0.1:0")
        .unwrap();

    let sent = sockets
        .send_safe("pipe-out", &json!({"job": 1}), Some(Duration::ZERO))
        .unwrap();
    assert!(!sent);
}

#[test]
fn test_recv_safe_returns_none_on_timeout() {
    let sockets = manager();
    sockets
        .ensure_and_bind("pipe-in", SocketKind::Pull, "tcp://127.0.0.1:0")
        .unwrap();

    let received = sockets
        .recv_safe("pipe-in", Some(Duration::from_millis(150)))
        .unwrap();
    assert!(received.is_none());
}

#[test]
fn test_poll_reflects_pending_data() {
    let sockets = manager();

    let address = sockets
        .ensure_and_bind("pipe-in", SocketKind::Pull, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .register_for_poll("pipe-in", Interest::Readable)
        .unwrap();

    // nothing pending: a non-blocking probe is empty
    assert!(sockets.poll(Some(Duration::ZERO)).unwrap().is_empty());
    assert!(!sockets.ready("pipe-in").unwrap());

    sockets
        .ensure_and_connect("pipe-out", SocketKind::Push, &address)
        .unwrap();
    assert!(sockets
        .send_safe("pipe-out", &json!({"job": 1}), TIMEOUT)
        .unwrap());

    // delivery latency is transport-bound; poll until the name shows up
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut ready = Vec::new();
    while Instant::now() < deadline {
        ready = sockets.poll(Some(Duration::from_millis(100))).unwrap();
        if !ready.is_empty() {
            break;
        }
    }
    assert_eq!(ready, vec!["pipe-in".to_string()]);
    assert!(sockets.ready("pipe-in").unwrap());
}

#[test]
fn test_close_unblocks_blocked_waiter() {
    let sockets = manager();
    sockets
        .ensure_and_bind("pipe-in", SocketKind::Pull, "tcp://127.0.0.1:0")
        .unwrap();

    let waiter = {
        let sockets = sockets.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let result = sockets.wait_until_ready("pipe-in", Some(Duration::from_secs(30)));
            (result, started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(300));
    sockets.close("pipe-in").unwrap();

    let (result, elapsed) = waiter.join().unwrap();
    assert!(matches!(result, Err(SocketError::Closed(_))));
    assert!(elapsed < Duration::from_secs(5), "waiter hung for {elapsed:?}");
}

#[test]
fn test_subscribe_iter_ends_when_endpoint_closes() {
    let sockets = manager();

    let address = sockets
        .ensure_and_bind("feed", SocketKind::Publish, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .ensure_and_connect("tap", SocketKind::Subscribe, &address)
        .unwrap();

    let stream = sockets.subscribe_iter("tap", "").unwrap();
    let (tx, rx) = mpsc::channel();
    let consumer = thread::spawn(move || {
        for event in stream {
            if tx.send(event).is_err() {
                break;
            }
        }
    });

    // publish until the consumer observes one event
    let mut observed = false;
    for _ in 0..100 {
        sockets
            .publish_safe("feed", "ticks", &json!({"seq": 1}))
            .unwrap();
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(50)) {
            assert_eq!(event.unwrap().topic(), "ticks");
            observed = true;
            break;
        }
    }
    assert!(observed, "subscriber never observed a published event");

    sockets.close("tap").unwrap();
    consumer.join().unwrap();
}

#[test]
fn test_log_layer_forwards_records_as_events() {
    use tracing_subscriber::prelude::*;

    let sockets = manager();
    let address = sockets
        .ensure_and_bind("logs", SocketKind::Publish, "tcp://127.0.0.1:0")
        .unwrap();
    sockets
        .ensure_and_connect("log-tap", SocketKind::Subscribe, &address)
        .unwrap();
    sockets.subscribe("log-tap", "logs").unwrap();

    let dispatch = tracing::Dispatch::new(
        tracing_subscriber::registry().with(sockets.log_layer("logs")),
    );

    // re-emit until the slow-joining subscriber sees a record
    let mut received = None;
    for _ in 0..50 {
        tracing::subscriber::with_default(dispatch.clone(), || {
            tracing::info!("server is up");
        });
        if let Some(event) = sockets
            .recv_event_safe("log-tap", Some(Duration::from_millis(100)))
            .unwrap()
        {
            received = Some(event);
            break;
        }
    }

    let event = received.expect("log record never arrived");
    assert_eq!(event.topic(), "logs");
    assert_eq!(event.payload()["msg"], json!("server is up"));
    assert_eq!(event.payload()["level"], json!("INFO"));
}
