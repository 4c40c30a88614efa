// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The socket registry and safe messaging layer
//!
//! [`SocketManager`] owns the name → endpoint mapping and everything that
//! touches the transport: create/bind/connect lifecycle, multiplexed
//! polling, and the safe send/receive calls that wrap raw transport I/O
//! with a non-blocking-first, poll-fallback retry loop.
//!
//! Transient conditions are results, not errors: `send_safe` returns
//! `false` and `recv_safe` returns `None` when the deadline passes, so
//! callers poll in plain loops instead of catching exceptions. Retries are
//! bounded by the deadline alone — one send/recv attempt per readiness
//! signal, with no artificial delay beyond the poller's own wait.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::addr;
use crate::common::{RegistryConfig, SocketError, SocketResult};
use crate::endpoint::{Endpoint, Interest, SocketKind, SocketOption, SocketRole};
use crate::event::{self, Event};
use crate::poller::{deadline_after, expired, remaining_after, Poller};
use crate::serializer::{JsonSerializer, Serializer};

struct ManagerInner {
    context: zmq::Context,
    config: RegistryConfig,
    serializer: Arc<dyn Serializer>,
    poller: Poller,
    sockets: Mutex<HashMap<String, Endpoint>>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        // best-effort teardown of whatever is still open
        for (_, endpoint) in self.sockets.get_mut().drain() {
            let _ = endpoint.close();
        }
    }
}

/// Named-socket registry over a shared transport context.
///
/// Cloning is cheap; clones share the same registry. The registry is
/// `Send + Sync`, but the intended usage is still one logical flow of
/// control per endpoint — the locks exist so that lookups never observe a
/// half-created or half-destroyed endpoint and so that `close` can cancel
/// waits issued from other threads.
#[derive(Clone)]
pub struct SocketManager {
    inner: Arc<ManagerInner>,
}

impl SocketManager {
    /// Create a registry with the default JSON serialization boundary.
    pub fn new(context: zmq::Context, config: RegistryConfig) -> Self {
        Self::with_serializer(context, config, Arc::new(JsonSerializer))
    }

    /// Create a registry with a caller-supplied serialization boundary.
    pub fn with_serializer(
        context: zmq::Context,
        config: RegistryConfig,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        let poller = Poller::new(config.poll_interval);
        Self {
            inner: Arc::new(ManagerInner {
                context,
                config,
                serializer,
                poller,
                sockets: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn context(&self) -> &zmq::Context {
        &self.inner.context
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// Registered endpoint names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.sockets.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.sockets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sockets.lock().is_empty()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a named endpoint, or return the existing one if `name` is
    /// already registered with the same kind.
    ///
    /// Fails with `AlreadyExists` when the name is taken by a different
    /// kind. New endpoints get the registry's high water marks and linger
    /// plus a fresh UUID identity (set pre-open, so Router/Dealer
    /// addressing works without extra setup).
    pub fn create(&self, name: &str, kind: SocketKind) -> SocketResult<Endpoint> {
        let mut sockets = self.inner.sockets.lock();
        if let Some(existing) = sockets.get(name) {
            if existing.kind() == kind {
                return Ok(existing.clone());
            }
            return Err(SocketError::AlreadyExists {
                name: name.to_string(),
                existing: existing.kind(),
            });
        }

        let socket = self.inner.context.socket(kind.to_zmq())?;
        let config = &self.inner.config;
        socket.set_sndhwm(config.send_hwm)?;
        socket.set_rcvhwm(config.recv_hwm)?;
        match config.linger {
            Some(linger) => socket.set_linger(linger.as_millis() as i32)?,
            None => socket.set_linger(0)?,
        }
        socket.set_identity(Uuid::new_v4().to_string().as_bytes())?;

        let endpoint = Endpoint::new(name, kind, socket);
        sockets.insert(name.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    /// Look up an endpoint by name.
    pub fn get(&self, name: &str) -> SocketResult<Endpoint> {
        self.inner
            .sockets
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| SocketError::NotFound(name.to_string()))
    }

    /// `get` falling back to `create`.
    pub fn get_or_create(&self, name: &str, kind: SocketKind) -> SocketResult<Endpoint> {
        self.create(name, kind)
    }

    /// Bind an endpoint and return the resolved address, which is how
    /// callers discover an auto-assigned port.
    ///
    /// Hostnames are resolved and wildcards normalized first. A port of
    /// `0` (or none) asks for an OS-probed free port; if that bind loses a
    /// race for the port, exactly one retry with a freshly probed port is
    /// attempted before `BindError` surfaces.
    pub fn bind(&self, name: &str, address: &str) -> SocketResult<String> {
        let endpoint = self.get(name)?;
        self.bind_endpoint(&endpoint, address)
    }

    /// Bind an endpoint to a wildcard address on an OS-probed free port
    /// and return the resolved address.
    pub fn bind_to_random_port(&self, name: &str) -> SocketResult<String> {
        self.bind(name, "tcp://0.0.0.0:0")
    }

    /// Connect an endpoint and return the resolved address.
    ///
    /// Failures surface immediately: the transport reconnects
    /// asynchronously for most patterns, so there is nothing useful to
    /// retry here.
    pub fn connect(&self, name: &str, address: &str) -> SocketResult<String> {
        let endpoint = self.get(name)?;
        self.connect_endpoint(&endpoint, address)
    }

    /// Ensure a named endpoint of `kind` exists and is bound to `address`.
    ///
    /// Already bound to this exact address counts as success; so does any
    /// existing binding when `address` asks for an ephemeral port.
    pub fn ensure_and_bind(
        &self,
        name: &str,
        kind: SocketKind,
        address: &str,
    ) -> SocketResult<String> {
        let endpoint = self.create(name, kind)?;
        if endpoint.role() == Some(SocketRole::Bound) {
            if addr::is_ephemeral_request(address) {
                if let Some(first) = endpoint.addresses().into_iter().next() {
                    return Ok(first);
                }
            } else {
                let (target, _) = addr::prepare_bind_address(address)?;
                if endpoint.addresses().contains(&target) {
                    return Ok(target);
                }
            }
        }
        self.bind_endpoint(&endpoint, address)
    }

    /// Ensure a named endpoint of `kind` exists and is connected to
    /// `address`; already connected to this exact address is success.
    pub fn ensure_and_connect(
        &self,
        name: &str,
        kind: SocketKind,
        address: &str,
    ) -> SocketResult<String> {
        let endpoint = self.create(name, kind)?;
        if endpoint.role() == Some(SocketRole::Connected) {
            let target = addr::prepare_connect_address(address)?;
            if endpoint.addresses().contains(&target) {
                return Ok(target);
            }
        }
        self.connect_endpoint(&endpoint, address)
    }

    /// Apply a transport-level socket option.
    ///
    /// Fails with `InvalidOption` when the option cannot change in the
    /// endpoint's current state (identity after the first bind/connect).
    pub fn set_socket_option(&self, name: &str, option: SocketOption) -> SocketResult<()> {
        self.get(name)?.apply_option(&option)
    }

    /// Replace the active subscription filter of a Subscribe endpoint.
    ///
    /// Filters are prefix matches on the topic bytes; the empty topic
    /// subscribes to everything. At most one filter is active per
    /// endpoint — re-subscribing replaces the previous filter rather than
    /// accumulating.
    pub fn set_topic(&self, name: &str, topic: &str) -> SocketResult<()> {
        let endpoint = self.get(name)?;
        if !endpoint.kind().can_subscribe() {
            return Err(SocketError::InvalidOperation {
                name: name.to_string(),
                kind: endpoint.kind(),
                operation: "subscribe",
            });
        }
        endpoint.replace_topic(topic.as_bytes())
    }

    /// Alias of [`set_topic`](Self::set_topic).
    pub fn subscribe(&self, name: &str, topic: &str) -> SocketResult<()> {
        self.set_topic(name, topic)
    }

    /// Drop an endpoint's transport connections without destroying the
    /// socket. Returns whether anything was disconnected.
    ///
    /// Disconnect is a connect-side operation; releasing a bound endpoint
    /// goes through [`close`](Self::close).
    pub fn disconnect(&self, name: &str) -> SocketResult<bool> {
        let endpoint = self.get(name)?;
        if endpoint.role() == Some(SocketRole::Bound) {
            return Err(SocketError::InvalidOperation {
                name: name.to_string(),
                kind: endpoint.kind(),
                operation: "disconnect a bound endpoint",
            });
        }

        let addresses = endpoint.addresses();
        if addresses.is_empty() {
            return Ok(false);
        }

        endpoint.with_socket(|socket| {
            for address in &addresses {
                socket.disconnect(address)?;
            }
            Ok(())
        })?;
        endpoint.clear_addresses();
        info!("🦀 [{}] '{}' disconnected", endpoint.kind(), name);
        Ok(true)
    }

    /// Release one endpoint's transport resources.
    ///
    /// Idempotent: closing an unknown or already-closed name succeeds.
    /// Any call blocked on the endpoint returns `Closed` within one poll
    /// slice.
    pub fn close(&self, name: &str) -> SocketResult<()> {
        let removed = self.inner.sockets.lock().remove(name);
        if let Some(endpoint) = removed {
            endpoint.close()?;
            info!("🦀 [{}] '{}' closed", endpoint.kind(), name);
        }
        Ok(())
    }

    /// Release every endpoint, even if some individual closes fail;
    /// failures are collected and reported together afterwards.
    pub fn close_all(&self) -> SocketResult<()> {
        let drained: Vec<(String, Endpoint)> = self.inner.sockets.lock().drain().collect();
        let mut failures = Vec::new();
        for (name, endpoint) in drained {
            if let Err(e) = endpoint.close() {
                failures.push(format!("{name}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SocketError::CloseFailed { failures })
        }
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// Register an endpoint for multiplexed polling.
    ///
    /// Receive operations register `Readable` automatically on first use;
    /// this call replaces whatever interest is currently registered.
    pub fn register_for_poll(&self, name: &str, interest: Interest) -> SocketResult<()> {
        self.get(name)?.set_interest(interest);
        Ok(())
    }

    /// Poll every registered endpoint under one shared deadline and
    /// return the names whose interest is satisfied.
    ///
    /// `Some(ZERO)` probes without blocking; `None` blocks until an
    /// endpoint is ready. The result reflects one poll cycle and goes
    /// stale at the next mutating registry call.
    pub fn poll(&self, timeout: Option<Duration>) -> SocketResult<Vec<String>> {
        let registered: Vec<Endpoint> = {
            let sockets = self.inner.sockets.lock();
            let mut registered: Vec<Endpoint> = sockets
                .values()
                .filter(|endpoint| endpoint.interest().is_some())
                .cloned()
                .collect();
            registered.sort_by(|a, b| a.name().cmp(b.name()));
            registered
        };
        self.inner.poller.poll(&registered, timeout)
    }

    /// Non-blocking probe of one endpoint, `poll(0)` filtered to a name.
    pub fn ready(&self, name: &str) -> SocketResult<bool> {
        let endpoint = self.get(name)?;
        self.inner.poller.ready(&endpoint)
    }

    /// Block until the endpoint has data (or satisfies its registered
    /// interest) or `timeout` elapses; returns whether it became ready.
    pub fn wait_until_ready(&self, name: &str, timeout: Option<Duration>) -> SocketResult<bool> {
        let endpoint = self.get(name)?;
        let interest = endpoint.interest().unwrap_or(Interest::Readable);
        self.inner.poller.wait_until_ready(&endpoint, interest, timeout)
    }

    // ------------------------------------------------------------------
    // Safe messaging
    // ------------------------------------------------------------------

    /// Serialize `payload` and send it, waiting for writability as needed.
    ///
    /// Returns `false` — not an error — when the deadline passes before
    /// the transport accepts the message. `Some(ZERO)` tries exactly once;
    /// `None` blocks until the send succeeds or the endpoint is closed.
    pub fn send_safe<T: Serialize>(
        &self,
        name: &str,
        payload: &T,
        timeout: Option<Duration>,
    ) -> SocketResult<bool> {
        let endpoint = self.get(name)?;
        self.check_operation(&endpoint, "send", SocketKind::can_send)?;
        let bytes = self.encode(payload)?;

        let deadline = deadline_after(timeout);
        loop {
            if endpoint.try_send(&bytes)? {
                return Ok(true);
            }
            if expired(timeout, deadline) {
                return Ok(false);
            }
            let remaining = remaining_after(timeout, deadline);
            if !self
                .inner
                .poller
                .wait_until_ready(&endpoint, Interest::Writable, remaining)?
            {
                return Ok(false);
            }
        }
    }

    /// Receive and deserialize one message.
    ///
    /// `None` is the no-data sentinel for an exhausted deadline; genuine
    /// faults (decode failure, closed endpoint) are errors.
    pub fn recv_safe(&self, name: &str, timeout: Option<Duration>) -> SocketResult<Option<Value>> {
        let endpoint = self.get(name)?;
        self.check_operation(&endpoint, "recv", SocketKind::can_recv)?;
        endpoint.merge_interest(Interest::Readable);
        match self.recv_bytes(&endpoint, timeout)? {
            Some(raw) => Ok(Some(self.inner.serializer.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Receive one publish/subscribe frame and unframe it into an
    /// [`Event`]; `None` when the deadline passes with no data.
    pub fn recv_event_safe(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> SocketResult<Option<Event>> {
        let endpoint = self.get(name)?;
        self.check_operation(&endpoint, "receive events", SocketKind::can_subscribe)?;
        endpoint.merge_interest(Interest::Readable);

        let raw = match self.recv_bytes(&endpoint, timeout)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let (topic, payload) = event::split(&raw)?;
        let topic = String::from_utf8_lossy(topic).into_owned();
        let payload = self.inner.serializer.decode(payload)?;
        Ok(Some(Event::new(topic, payload, raw)))
    }

    /// Frame `payload` under `topic` and send it on a Publish endpoint.
    ///
    /// Publish delivery is at-most-once: there is no retry on would-block,
    /// and a dropped publish reports `false` rather than an error.
    pub fn publish_safe<T: Serialize>(
        &self,
        name: &str,
        topic: &str,
        payload: &T,
    ) -> SocketResult<bool> {
        let endpoint = self.get(name)?;
        self.check_operation(&endpoint, "publish", SocketKind::can_publish)?;
        let bytes = self.encode(payload)?;
        let framed = event::frame(topic.as_bytes(), &bytes)?;
        endpoint.try_send(&framed)
    }

    /// Set the subscription filter and return an iterator that yields
    /// events until the endpoint is closed.
    pub fn subscribe_iter(&self, name: &str, topic: &str) -> SocketResult<EventStream> {
        self.set_topic(name, topic)?;
        Ok(EventStream {
            manager: self.clone(),
            name: name.to_string(),
        })
    }

    // ------------------------------------------------------------------

    fn bind_endpoint(&self, endpoint: &Endpoint, address: &str) -> SocketResult<String> {
        if endpoint.role() == Some(SocketRole::Connected) {
            return Err(SocketError::BindError {
                name: endpoint.name().to_string(),
                address: address.to_string(),
                reason: "endpoint is connected; bind and connect are mutually exclusive"
                    .to_string(),
            });
        }

        let (resolved, ephemeral) = addr::prepare_bind_address(address)?;
        let resolved = match endpoint.with_socket(|socket| socket.bind(&resolved)) {
            Ok(()) => resolved,
            Err(SocketError::Transport(_)) if ephemeral => {
                // the probed port can be taken between probe and bind
                let (retry, _) = addr::prepare_bind_address(address)?;
                match endpoint.with_socket(|socket| socket.bind(&retry)) {
                    Ok(()) => retry,
                    Err(SocketError::Transport(e)) => {
                        return Err(SocketError::BindError {
                            name: endpoint.name().to_string(),
                            address: retry,
                            reason: e.to_string(),
                        })
                    }
                    Err(other) => return Err(other),
                }
            }
            Err(SocketError::Transport(e)) => {
                return Err(SocketError::BindError {
                    name: endpoint.name().to_string(),
                    address: resolved,
                    reason: e.to_string(),
                })
            }
            Err(other) => return Err(other),
        };

        endpoint.record_open(SocketRole::Bound, &resolved);
        info!(
            "🦀 [{}] '{}' bound to {}",
            endpoint.kind(),
            endpoint.name(),
            resolved
        );
        Ok(resolved)
    }

    fn connect_endpoint(&self, endpoint: &Endpoint, address: &str) -> SocketResult<String> {
        if endpoint.role() == Some(SocketRole::Bound) {
            return Err(SocketError::ConnectError {
                name: endpoint.name().to_string(),
                address: address.to_string(),
                reason: "endpoint is bound; bind and connect are mutually exclusive".to_string(),
            });
        }

        let resolved = addr::prepare_connect_address(address)?;
        match endpoint.with_socket(|socket| socket.connect(&resolved)) {
            Ok(()) => {}
            Err(SocketError::Transport(e)) => {
                return Err(SocketError::ConnectError {
                    name: endpoint.name().to_string(),
                    address: resolved,
                    reason: e.to_string(),
                })
            }
            Err(other) => return Err(other),
        }

        endpoint.record_open(SocketRole::Connected, &resolved);
        info!(
            "🦀 [{}] '{}' connected to {}",
            endpoint.kind(),
            endpoint.name(),
            resolved
        );
        Ok(resolved)
    }

    fn encode<T: Serialize>(&self, payload: &T) -> SocketResult<Vec<u8>> {
        let value = serde_json::to_value(payload).map_err(|e| SocketError::Encode(e.to_string()))?;
        self.inner.serializer.encode(&value)
    }

    fn recv_bytes(
        &self,
        endpoint: &Endpoint,
        timeout: Option<Duration>,
    ) -> SocketResult<Option<Vec<u8>>> {
        let deadline = deadline_after(timeout);
        loop {
            if let Some(raw) = endpoint.try_recv()? {
                return Ok(Some(raw));
            }
            if expired(timeout, deadline) {
                return Ok(None);
            }
            let remaining = remaining_after(timeout, deadline);
            if !self
                .inner
                .poller
                .wait_until_ready(endpoint, Interest::Readable, remaining)?
            {
                return Ok(None);
            }
        }
    }

    fn check_operation(
        &self,
        endpoint: &Endpoint,
        operation: &'static str,
        allowed: impl Fn(SocketKind) -> bool,
    ) -> SocketResult<()> {
        if !allowed(endpoint.kind()) {
            return Err(SocketError::InvalidOperation {
                name: endpoint.name().to_string(),
                kind: endpoint.kind(),
                operation,
            });
        }
        if endpoint.addresses().is_empty() {
            return Err(SocketError::InvalidOperation {
                name: endpoint.name().to_string(),
                kind: endpoint.kind(),
                operation: "use before bind or connect",
            });
        }
        Ok(())
    }
}

impl Default for SocketManager {
    fn default() -> Self {
        Self::new(zmq::Context::new(), RegistryConfig::default())
    }
}

impl fmt::Debug for SocketManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocketManager(sockets={:?})", self.names())
    }
}

/// Blocking event stream over a Subscribe endpoint.
///
/// Ends when the endpoint is closed or removed from the registry; decode
/// and framing faults are yielded as errors without ending the stream.
pub struct EventStream {
    manager: SocketManager,
    name: String,
}

impl Iterator for EventStream {
    type Item = SocketResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.manager.recv_event_safe(&self.name, None) {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(SocketError::Closed(_)) | Err(SocketError::NotFound(_)) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
