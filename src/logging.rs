// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Log forwarding over a Publish endpoint
//!
//! [`PublishLayer`] is a `tracing-subscriber` layer that turns every log
//! record into a published `{msg, level, target, fields}` event on a named
//! Publish endpoint. It is purely additive: publish failures are swallowed
//! so a slow or unbound log socket can never disturb the caller, matching
//! publish/subscribe's at-most-once model.
//!
//! The registry's own lifecycle logging (bind/connect/close) happens
//! outside the send path, so forwarding those records through a socket
//! owned by the same registry does not recurse.

use std::fmt;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event as TracingEvent, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::registry::SocketManager;

/// Default topic log records are published under
pub const DEFAULT_LOG_TOPIC: &str = "logs";

/// Forwards log records as published events.
#[derive(Clone)]
pub struct PublishLayer {
    manager: SocketManager,
    socket_name: String,
    topic: String,
}

impl PublishLayer {
    /// Forward records through `socket_name` under the default topic.
    pub fn new(manager: SocketManager, socket_name: impl Into<String>) -> Self {
        Self {
            manager,
            socket_name: socket_name.into(),
            topic: DEFAULT_LOG_TOPIC.to_string(),
        }
    }

    /// Publish under a different topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

impl SocketManager {
    /// A [`PublishLayer`] forwarding log records through a
    /// previously-created Publish endpoint of this registry.
    pub fn log_layer(&self, socket_name: &str) -> PublishLayer {
        PublishLayer::new(self.clone(), socket_name)
    }
}

impl<S: Subscriber> Layer<S> for PublishLayer {
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: Context<'_, S>) {
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let metadata = event.metadata();
        let mut record = Map::new();
        record.insert("msg".to_string(), Value::String(visitor.message));
        record.insert(
            "level".to_string(),
            Value::String(metadata.level().to_string()),
        );
        record.insert(
            "target".to_string(),
            Value::String(metadata.target().to_string()),
        );
        if !visitor.fields.is_empty() {
            record.insert("fields".to_string(), Value::Object(visitor.fields));
        }

        // a log sink must never fail the caller
        let _ = self
            .manager
            .publish_safe(&self.socket_name, &self.topic, &Value::Object(record));
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.insert(
                field.name().to_string(),
                Value::String(format!("{value:?}")),
            );
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), Value::from(value));
    }
}
