// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # sockmux
//!
//! Named socket registry and safe messaging engine on top of ZeroMQ.
//!
//! A [`SocketManager`] lets an application create, label, bind, connect
//! and tear down many transport endpoints at once, multiplex blocking
//! waits across all of them, and exchange framed, serialized payloads —
//! without hand-rolling retry, timeout or partial-send handling for each
//! endpoint.
//!
//! The transport itself (framing, socket types, reconnection) is
//! libzmq's, through the `zmq` crate; this crate owns what sits above it:
//! endpoint identity and reuse, bind-vs-connect lifecycle, multi-socket
//! polling with one shared deadline, bounded retry for transient
//! would-block conditions, and a pluggable wire-encoding boundary.
//!
//! ## Example: request-reply over an ephemeral port
//!
//! ```no_run
//! use sockmux::{RegistryConfig, SocketKind, SocketManager};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let sockets = SocketManager::new(zmq::Context::new(), RegistryConfig::default());
//!
//! // bind discovers the auto-assigned port through the returned address
//! let address = sockets.ensure_and_bind("replies", SocketKind::Reply, "tcp://127.0.0.1:0")?;
//! sockets.ensure_and_connect("requests", SocketKind::Request, &address)?;
//!
//! let timeout = Some(Duration::from_secs(5));
//! sockets.send_safe("requests", &json!({"action": "ping"}), timeout)?;
//! if let Some(request) = sockets.recv_safe("replies", timeout)? {
//!     println!("request: {request}");
//!     sockets.send_safe("replies", &json!({"ok": true}), timeout)?;
//! }
//! # Ok::<(), sockmux::SocketError>(())
//! ```
//!
//! ## Example: publish-subscribe with topic filtering
//!
//! ```no_run
//! use sockmux::{SocketKind, SocketManager};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let sockets = SocketManager::default();
//! let address = sockets.ensure_and_bind("feed", SocketKind::Publish, "tcp://127.0.0.1:0")?;
//! sockets.ensure_and_connect("events", SocketKind::Subscribe, &address)?;
//!
//! // prefix filter: also matches "orders.created", "orders.paid", ...
//! sockets.subscribe("events", "orders")?;
//!
//! sockets.publish_safe("feed", "orders.created", &json!({"id": 7}))?;
//! if let Some(event) = sockets.recv_event_safe("events", Some(Duration::from_secs(1)))? {
//!     println!("{} => {}", event.topic(), event.payload());
//! }
//! # Ok::<(), sockmux::SocketError>(())
//! ```
//!
//! ## Timeouts are results, not exceptions
//!
//! A deadline that passes with nothing sent or received is a normal,
//! checkable outcome: `send_safe` returns `false`, `recv_safe` returns
//! `None`. Hard errors are reserved for genuine faults — unknown names,
//! name/kind conflicts, bind/connect rejections, malformed event frames,
//! serialization failures, and operations on closed endpoints. Closing an
//! endpoint unblocks anything waiting on it with [`SocketError::Closed`].

pub mod addr;
pub mod common;
pub mod endpoint;
pub mod event;
pub mod logging;
pub mod poller;
pub mod registry;
pub mod serializer;

pub use common::{RegistryConfig, SocketError, SocketResult};
pub use endpoint::{Endpoint, Interest, SocketKind, SocketOption, SocketRole};
pub use event::Event;
pub use logging::PublishLayer;
pub use registry::{EventStream, SocketManager};
pub use serializer::{JsonSerializer, Serializer};

// Re-exported so callers can construct contexts without a separate dep
pub use zmq;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::common::{RegistryConfig, SocketError, SocketResult};
    pub use crate::endpoint::{Endpoint, Interest, SocketKind, SocketOption, SocketRole};
    pub use crate::event::Event;
    pub use crate::logging::PublishLayer;
    pub use crate::registry::{EventStream, SocketManager};
    pub use crate::serializer::{JsonSerializer, Serializer};
}
