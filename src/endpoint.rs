// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Named endpoint handles
//!
//! An [`Endpoint`] is a named, typed transport handle. The raw
//! `zmq::Socket` lives behind a mutex so handles can be cloned across
//! threads and closed from one thread while another is blocked waiting on
//! it; transport calls themselves are still one-at-a-time per endpoint.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::common::{SocketError, SocketResult};

/// Messaging pattern of an endpoint, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketKind {
    Request,
    Reply,
    Publish,
    Subscribe,
    Push,
    Pull,
    Router,
    Dealer,
}

impl SocketKind {
    pub(crate) fn to_zmq(self) -> zmq::SocketType {
        match self {
            Self::Request => zmq::REQ,
            Self::Reply => zmq::REP,
            Self::Publish => zmq::PUB,
            Self::Subscribe => zmq::SUB,
            Self::Push => zmq::PUSH,
            Self::Pull => zmq::PULL,
            Self::Router => zmq::ROUTER,
            Self::Dealer => zmq::DEALER,
        }
    }

    /// Kinds that `send_safe` accepts. Router is excluded: its wire
    /// format is multipart with routing identities, which the safe layer
    /// does not frame; use a Dealer or the raw socket access instead.
    pub fn can_send(self) -> bool {
        matches!(self, Self::Request | Self::Reply | Self::Push | Self::Dealer)
    }

    /// Kinds that `recv_safe` accepts
    pub fn can_recv(self) -> bool {
        matches!(self, Self::Request | Self::Reply | Self::Pull | Self::Dealer)
    }

    /// Kinds that `publish_safe` accepts
    pub fn can_publish(self) -> bool {
        matches!(self, Self::Publish)
    }

    /// Kinds that carry a subscription filter and receive framed events
    pub fn can_subscribe(self) -> bool {
        matches!(self, Self::Subscribe)
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Request => "REQ",
            Self::Reply => "REP",
            Self::Publish => "PUB",
            Self::Subscribe => "SUB",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
            Self::Router => "ROUTER",
            Self::Dealer => "DEALER",
        };
        f.write_str(name)
    }
}

/// Whether the endpoint's first address came from a bind or a connect.
/// The two are mutually exclusive for the lifetime of the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Bound,
    Connected,
}

/// Poll direction an endpoint is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
    Both,
}

impl Interest {
    pub(crate) fn events(self) -> zmq::PollEvents {
        match self {
            Self::Readable => zmq::POLLIN,
            Self::Writable => zmq::POLLOUT,
            Self::Both => zmq::POLLIN | zmq::POLLOUT,
        }
    }

    pub(crate) fn merge(self, other: Interest) -> Interest {
        if self == other {
            self
        } else {
            Interest::Both
        }
    }

    pub(crate) fn wants_read(self) -> bool {
        matches!(self, Self::Readable | Self::Both)
    }

    pub(crate) fn wants_write(self) -> bool {
        matches!(self, Self::Writable | Self::Both)
    }
}

/// Transport-level socket options, a closed set mapped onto the
/// transport's native option codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    /// Linger period on close (None = infinite)
    Linger(Option<Duration>),
    /// Transport-level receive timeout (None = blocking)
    RecvTimeout(Option<Duration>),
    /// Transport-level send timeout (None = blocking)
    SendTimeout(Option<Duration>),
    SendHighWaterMark(i32),
    RecvHighWaterMark(i32),
    /// Socket identity; only legal before the first bind/connect
    Identity(Vec<u8>),
}

impl SocketOption {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linger(_) => "linger",
            Self::RecvTimeout(_) => "receive-timeout",
            Self::SendTimeout(_) => "send-timeout",
            Self::SendHighWaterMark(_) => "send-high-water-mark",
            Self::RecvHighWaterMark(_) => "receive-high-water-mark",
            Self::Identity(_) => "identity",
        }
    }
}

#[derive(Default)]
struct EndpointState {
    role: Option<SocketRole>,
    addresses: Vec<String>,
    topic: Option<Vec<u8>>,
    interest: Option<Interest>,
}

struct EndpointInner {
    name: String,
    kind: SocketKind,
    socket: Mutex<Option<zmq::Socket>>,
    state: Mutex<EndpointState>,
    closed: AtomicBool,
}

/// A named transport handle owned by a registry.
///
/// Cloning is cheap and clones refer to the same underlying socket;
/// equality is handle identity.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    pub(crate) fn new(name: &str, kind: SocketKind, socket: zmq::Socket) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                name: name.to_string(),
                kind,
                socket: Mutex::new(Some(socket)),
                state: Mutex::new(EndpointState::default()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> SocketKind {
        self.inner.kind
    }

    pub fn role(&self) -> Option<SocketRole> {
        self.inner.state.lock().role
    }

    /// Resolved addresses this endpoint is currently bound or connected to,
    /// in the order they were opened
    pub fn addresses(&self) -> Vec<String> {
        self.inner.state.lock().addresses.clone()
    }

    /// The active subscription filter, if any
    pub fn topic(&self) -> Option<Vec<u8>> {
        self.inner.state.lock().topic.clone()
    }

    pub fn interest(&self) -> Option<Interest> {
        self.inner.state.lock().interest
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Run a closure against the raw transport socket.
    ///
    /// Escape hatch for patterns the safe layer does not frame (e.g.
    /// Router multipart traffic). Fails with `Closed` once the endpoint
    /// has been released.
    pub fn with_socket<T>(
        &self,
        f: impl FnOnce(&zmq::Socket) -> Result<T, zmq::Error>,
    ) -> SocketResult<T> {
        let guard = self.inner.socket.lock();
        match guard.as_ref() {
            Some(socket) => f(socket).map_err(SocketError::from),
            None => Err(SocketError::Closed(self.inner.name.clone())),
        }
    }

    pub(crate) fn socket_cell(&self) -> &Mutex<Option<zmq::Socket>> {
        &self.inner.socket
    }

    /// Non-blocking send. Ok(false) means the transport would block.
    pub(crate) fn try_send(&self, bytes: &[u8]) -> SocketResult<bool> {
        let guard = self.inner.socket.lock();
        match guard.as_ref() {
            None => Err(SocketError::Closed(self.inner.name.clone())),
            Some(socket) => match socket.send(bytes, zmq::DONTWAIT) {
                Ok(()) => Ok(true),
                Err(zmq::Error::EAGAIN) => Ok(false),
                Err(e) => Err(SocketError::Transport(e)),
            },
        }
    }

    /// Non-blocking receive. Ok(None) means no data was available.
    pub(crate) fn try_recv(&self) -> SocketResult<Option<Vec<u8>>> {
        let guard = self.inner.socket.lock();
        match guard.as_ref() {
            None => Err(SocketError::Closed(self.inner.name.clone())),
            Some(socket) => match socket.recv_bytes(zmq::DONTWAIT) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(zmq::Error::EAGAIN) => Ok(None),
                Err(e) => Err(SocketError::Transport(e)),
            },
        }
    }

    pub(crate) fn record_open(&self, role: SocketRole, address: &str) {
        let mut state = self.inner.state.lock();
        state.role.get_or_insert(role);
        if !state.addresses.iter().any(|a| a == address) {
            state.addresses.push(address.to_string());
        }
    }

    pub(crate) fn clear_addresses(&self) -> Vec<String> {
        let mut state = self.inner.state.lock();
        state.interest = None;
        std::mem::take(&mut state.addresses)
    }

    pub(crate) fn set_interest(&self, interest: Interest) {
        self.inner.state.lock().interest = Some(interest);
    }

    pub(crate) fn merge_interest(&self, interest: Interest) {
        let mut state = self.inner.state.lock();
        state.interest = Some(match state.interest {
            Some(existing) => existing.merge(interest),
            None => interest,
        });
    }

    /// Replace the active subscription filter (at most one per endpoint)
    pub(crate) fn replace_topic(&self, topic: &[u8]) -> SocketResult<()> {
        let previous = self.inner.state.lock().topic.clone();
        self.with_socket(|socket| {
            if let Some(prev) = &previous {
                socket.set_unsubscribe(prev)?;
            }
            socket.set_subscribe(topic)
        })?;
        self.inner.state.lock().topic = Some(topic.to_vec());
        Ok(())
    }

    pub(crate) fn apply_option(&self, option: &SocketOption) -> SocketResult<()> {
        if matches!(option, SocketOption::Identity(_)) && self.role().is_some() {
            return Err(SocketError::InvalidOption {
                name: self.inner.name.clone(),
                option: option.name().to_string(),
                reason: "identity cannot change after the first bind/connect".to_string(),
            });
        }

        self.with_socket(|socket| match option {
            SocketOption::Linger(linger) => socket.set_linger(duration_ms(*linger)),
            SocketOption::RecvTimeout(timeout) => socket.set_rcvtimeo(duration_ms(*timeout)),
            SocketOption::SendTimeout(timeout) => socket.set_sndtimeo(duration_ms(*timeout)),
            SocketOption::SendHighWaterMark(hwm) => socket.set_sndhwm(*hwm),
            SocketOption::RecvHighWaterMark(hwm) => socket.set_rcvhwm(*hwm),
            SocketOption::Identity(identity) => socket.set_identity(identity),
        })
    }

    /// Release the transport socket. Idempotent; any caller blocked on
    /// this endpoint observes `Closed` within one poll slice.
    pub(crate) fn close(&self) -> SocketResult<()> {
        self.inner.closed.store(true, Ordering::Release);
        let socket = self.inner.socket.lock().take();
        if let Some(socket) = socket {
            // drop unsent messages instead of lingering at teardown
            socket.set_linger(0).map_err(SocketError::Transport)?;
        }
        Ok(())
    }
}

fn duration_ms(duration: Option<Duration>) -> i32 {
    match duration {
        Some(d) => d.as_millis() as i32,
        None => -1,
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Endpoint {}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Endpoint")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("role", &state.role)
            .field("addresses", &state.addresses)
            .field("closed", &self.is_closed())
            .finish()
    }
}
