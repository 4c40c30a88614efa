// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Multiplexed readiness waits
//!
//! One poll cycle covers any number of endpoints under a single shared
//! deadline, which is the reason this exists: looping per-endpoint with
//! independent timeouts would turn an O(timeout) wait into O(n·timeout).
//!
//! Waits run as a loop of bounded `zmq::poll` slices. No socket lock is
//! held for longer than one slice, so a close issued from another thread
//! unblocks a waiting call (with `Closed`) within one slice.

use std::time::{Duration, Instant};

use crate::common::{SocketError, SocketResult};
use crate::endpoint::{Endpoint, Interest};

pub struct Poller {
    poll_interval: Duration,
}

impl Poller {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Wait up to `timeout` for any of `endpoints` to satisfy its
    /// registered interest and return the names that did.
    ///
    /// `Some(ZERO)` is a non-blocking probe; `None` blocks until an
    /// endpoint is ready or every polled endpoint has been closed.
    pub fn poll(
        &self,
        endpoints: &[Endpoint],
        timeout: Option<Duration>,
    ) -> SocketResult<Vec<String>> {
        if endpoints.is_empty() {
            if let Some(timeout) = timeout {
                std::thread::sleep(timeout);
            }
            return Ok(Vec::new());
        }

        let deadline = deadline_after(timeout);
        loop {
            let slice = self.next_slice(timeout, deadline);
            let ready = poll_once(endpoints, slice)?;
            if !ready.is_empty() {
                return Ok(ready);
            }
            if endpoints.iter().all(Endpoint::is_closed) {
                return Ok(Vec::new());
            }
            if expired(timeout, deadline) {
                return Ok(Vec::new());
            }
        }
    }

    /// Non-blocking probe of a single endpoint against its registered
    /// interest (readable by default).
    pub fn ready(&self, endpoint: &Endpoint) -> SocketResult<bool> {
        let interest = endpoint.interest().unwrap_or(Interest::Readable);
        match self.wait_until_ready(endpoint, interest, Some(Duration::ZERO)) {
            Ok(ready) => Ok(ready),
            Err(SocketError::Closed(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Block until `endpoint` satisfies `interest` or `timeout` elapses.
    ///
    /// Returns whether the endpoint became ready; fails with `Closed` if
    /// the endpoint is closed before or while waiting.
    pub fn wait_until_ready(
        &self,
        endpoint: &Endpoint,
        interest: Interest,
        timeout: Option<Duration>,
    ) -> SocketResult<bool> {
        let deadline = deadline_after(timeout);
        loop {
            if endpoint.is_closed() {
                return Err(SocketError::Closed(endpoint.name().to_string()));
            }

            let slice = self.next_slice(timeout, deadline);
            let ready = {
                let guard = endpoint.socket_cell().lock();
                match guard.as_ref() {
                    None => return Err(SocketError::Closed(endpoint.name().to_string())),
                    Some(socket) => {
                        let mut items = [socket.as_poll_item(interest.events())];
                        zmq::poll(&mut items, as_ms(slice))?;
                        (interest.wants_read() && items[0].is_readable())
                            || (interest.wants_write() && items[0].is_writable())
                    }
                }
            };

            if ready {
                return Ok(true);
            }
            if expired(timeout, deadline) {
                return Ok(false);
            }
        }
    }

    fn next_slice(&self, timeout: Option<Duration>, deadline: Option<Instant>) -> Duration {
        match (timeout, deadline) {
            // finite timeout: cap the slice at the remaining budget
            (Some(_), Some(deadline)) => deadline
                .saturating_duration_since(Instant::now())
                .min(self.poll_interval),
            _ => self.poll_interval,
        }
    }
}

fn poll_once(endpoints: &[Endpoint], slice: Duration) -> SocketResult<Vec<String>> {
    // interests are read before the socket locks; state and socket locks
    // are never held together
    let interests: Vec<Interest> = endpoints
        .iter()
        .map(|e| e.interest().unwrap_or(Interest::Readable))
        .collect();

    let guards: Vec<_> = endpoints.iter().map(|e| e.socket_cell().lock()).collect();

    let mut items = Vec::with_capacity(endpoints.len());
    let mut polled = Vec::with_capacity(endpoints.len());
    for (index, guard) in guards.iter().enumerate() {
        if let Some(socket) = guard.as_ref() {
            items.push(socket.as_poll_item(interests[index].events()));
            polled.push(index);
        }
    }
    if items.is_empty() {
        return Ok(Vec::new());
    }

    zmq::poll(&mut items, as_ms(slice))?;

    let mut ready = Vec::new();
    for (item, index) in items.iter().zip(polled) {
        let interest = interests[index];
        if (interest.wants_read() && item.is_readable())
            || (interest.wants_write() && item.is_writable())
        {
            ready.push(endpoints[index].name().to_string());
        }
    }
    Ok(ready)
}

pub(crate) fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|t| Instant::now().checked_add(t))
}

pub(crate) fn expired(timeout: Option<Duration>, deadline: Option<Instant>) -> bool {
    match (timeout, deadline) {
        (Some(_), Some(deadline)) => Instant::now() >= deadline,
        // a finite timeout too large to represent never expires either
        _ => false,
    }
}

pub(crate) fn remaining_after(
    timeout: Option<Duration>,
    deadline: Option<Instant>,
) -> Option<Duration> {
    match (timeout, deadline) {
        (Some(_), Some(deadline)) => Some(deadline.saturating_duration_since(Instant::now())),
        _ => None,
    }
}

fn as_ms(duration: Duration) -> i64 {
    duration.as_millis() as i64
}
