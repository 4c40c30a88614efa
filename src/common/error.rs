// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types shared across the crate.
//!
//! Transient conditions (no data yet, send would block past the deadline)
//! are *not* errors: the safe messaging calls report them as `false` or
//! `None` so polling loops stay the default idiom. Everything in
//! [`SocketError`] is a genuine fault that the caller must handle.

use thiserror::Error;

use crate::endpoint::SocketKind;

/// Result type alias for registry operations
pub type SocketResult<T> = Result<T, SocketError>;

/// Errors raised by the socket registry and the safe messaging layer
#[derive(Debug, Error)]
pub enum SocketError {
    /// Lookup of a name that was never registered (or already closed)
    #[error("no socket named '{0}' is registered")]
    NotFound(String),

    /// A socket with this name exists under a different kind
    #[error("socket '{name}' already exists with kind {existing}")]
    AlreadyExists { name: String, existing: SocketKind },

    /// The transport rejected a bind (port in use, permission, bad address)
    #[error("could not bind '{name}' to {address}: {reason}")]
    BindError {
        name: String,
        address: String,
        reason: String,
    },

    /// The transport rejected a connect
    #[error("could not connect '{name}' to {address}: {reason}")]
    ConnectError {
        name: String,
        address: String,
        reason: String,
    },

    /// A socket option that is illegal in the endpoint's current state
    #[error("option {option} cannot be applied to '{name}': {reason}")]
    InvalidOption {
        name: String,
        option: String,
        reason: String,
    },

    /// Operation outside the kind's allowed-operations table
    #[error("operation not supported by {kind} socket '{name}': {operation}")]
    InvalidOperation {
        name: String,
        kind: SocketKind,
        operation: &'static str,
    },

    /// A publish frame that cannot be framed or unframed
    #[error("malformed event frame: {0}")]
    MalformedEvent(String),

    /// The endpoint was closed, either before the call or while it was blocked
    #[error("socket '{0}' was closed")]
    Closed(String),

    /// Serialization boundary failed to encode a payload
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// Serialization boundary failed to decode received bytes
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// The address resolver rejected an address string
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Unrecoverable transport-level fault
    #[error("transport error: {0}")]
    Transport(zmq::Error),

    /// I/O error (free-port probing)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// One or more endpoints failed to release during `close_all`
    #[error("failed to close every socket: {}", .failures.join("; "))]
    CloseFailed { failures: Vec<String> },
}

impl From<zmq::Error> for SocketError {
    fn from(err: zmq::Error) -> Self {
        Self::Transport(err)
    }
}
