// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Publish/subscribe event framing
//!
//! Publish frames are `topic`, one separator byte (0x20), then the
//! serialized payload. Subscription filters are prefix matches on the raw
//! frame bytes, which is the transport's native behavior: a filter of
//! `orders` matches a frame starting `orders.created `. Topics must not
//! contain the separator.

use std::time::SystemTime;

use serde_json::Value;

use crate::common::{SocketError, SocketResult};

/// Byte separating the topic from the payload in a publish frame
pub const TOPIC_SEPARATOR: u8 = b' ';

/// A decoded, topic-tagged received message.
///
/// Constructed only on receipt and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Event {
    topic: String,
    payload: Value,
    raw: Vec<u8>,
    received_at: SystemTime,
}

impl Event {
    pub(crate) fn new(topic: String, payload: Value, raw: Vec<u8>) -> Self {
        Self {
            topic,
            payload,
            raw,
            received_at: SystemTime::now(),
        }
    }

    /// Topic the event was published under; empty in absence of a topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The deserialized event payload
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The original wire frame, separator and all
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }
}

/// Build a publish frame from a topic and an encoded payload.
pub(crate) fn frame(topic: &[u8], payload: &[u8]) -> SocketResult<Vec<u8>> {
    if topic.contains(&TOPIC_SEPARATOR) {
        return Err(SocketError::MalformedEvent(format!(
            "topic {:?} contains the separator byte",
            String::from_utf8_lossy(topic)
        )));
    }

    let mut framed = Vec::with_capacity(topic.len() + 1 + payload.len());
    framed.extend_from_slice(topic);
    framed.push(TOPIC_SEPARATOR);
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Split a received frame at the first separator into (topic, payload).
///
/// A frame without a separator is a producer bug and is surfaced rather
/// than dropped.
pub(crate) fn split(raw: &[u8]) -> SocketResult<(&[u8], &[u8])> {
    match raw.iter().position(|b| *b == TOPIC_SEPARATOR) {
        Some(at) => Ok((&raw[..at], &raw[at + 1..])),
        None => Err(SocketError::MalformedEvent(
            "no topic separator in frame".to_string(),
        )),
    }
}
