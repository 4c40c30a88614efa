// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared types: configuration and errors

pub mod config;
pub mod error;

pub use config::RegistryConfig;
pub use error::{SocketError, SocketResult};
