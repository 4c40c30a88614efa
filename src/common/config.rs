//! Registry-wide configuration defaults

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration shared by every endpoint a registry creates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Length of one poll slice; bounds how long any wait holds a socket
    /// lock and how quickly a close is observed by blocked callers
    pub poll_interval: Duration,

    /// High water mark for send buffers
    pub send_hwm: i32,

    /// High water mark for receive buffers
    pub recv_hwm: i32,

    /// Linger time on close (None = immediate)
    pub linger: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            send_hwm: 1000,
            recv_hwm: 1000,
            linger: Some(Duration::from_millis(1000)),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll slice length
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the send high water mark
    pub fn with_send_hwm(mut self, hwm: i32) -> Self {
        self.send_hwm = hwm;
        self
    }

    /// Set the receive high water mark
    pub fn with_recv_hwm(mut self, hwm: i32) -> Self {
        self.recv_hwm = hwm;
        self
    }

    /// Set the linger time applied to new sockets
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    /// Close sockets immediately, dropping unsent messages
    pub fn with_no_linger(mut self) -> Self {
        self.linger = None;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll interval must be greater than zero".to_string());
        }
        if self.send_hwm < 0 || self.recv_hwm < 0 {
            return Err("high water marks cannot be negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RegistryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = RegistryConfig::default().with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = RegistryConfig::new()
            .with_poll_interval(Duration::from_millis(50))
            .with_send_hwm(10)
            .with_no_linger();
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.send_hwm, 10);
        assert!(config.linger.is_none());
    }
}
