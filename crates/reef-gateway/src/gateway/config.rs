//! Gateway connection configuration.

use std::time::Duration;

use crate::reconnect::BackoffConfig;

/// Default Reef server WebSocket endpoint.
pub const DEFAULT_URL: &str = "ws://localhost:7651/ws";

/// Configuration for a [`Gateway`](super::Gateway).
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    // URL
    /// WebSocket endpoint URL.
    pub url: String,

    // Reconnection settings
    /// Countdown length after a disconnect, before any backoff growth.
    pub reconnect_interval: Duration,
    /// Upper bound for the countdown length.
    pub reconnect_max_interval: Duration,
    /// Multiplier applied per consecutive failed attempt (1.0 = fixed interval).
    pub reconnect_backoff_factor: f64,
    /// Random jitter factor (0.0-1.0) for the countdown length.
    pub reconnect_jitter: f64,
    /// Period of one countdown tick.
    pub tick_interval: Duration,

    // Request handling
    /// Maximum number of requests awaiting acknowledgement.
    pub max_pending_requests: usize,

    // Channels
    /// Capacity of the control channel to the connection task.
    pub command_channel_capacity: usize,
    /// Capacity of the broadcast channel behind [`Gateway::events`](super::Gateway::events).
    pub event_channel_capacity: usize,

    // Connection
    /// Timeout for a single connection attempt.
    pub connect_timeout: Duration,
    /// Maximum inbound message size in bytes (0 = unlimited).
    pub max_message_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            reconnect_interval: Duration::from_secs(5),
            reconnect_max_interval: Duration::from_secs(60),
            reconnect_backoff_factor: 1.0,
            reconnect_jitter: 0.0,
            tick_interval: Duration::from_secs(1),
            max_pending_requests: 1000,
            command_channel_capacity: 64,
            event_channel_capacity: 256,
            connect_timeout: Duration::from_secs(10),
            max_message_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the countdown length after a disconnect.
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the maximum countdown length.
    #[must_use]
    pub fn reconnect_max_interval(mut self, interval: Duration) -> Self {
        self.reconnect_max_interval = interval;
        self
    }

    /// Set the reconnection backoff factor.
    #[must_use]
    pub fn reconnect_backoff_factor(mut self, factor: f64) -> Self {
        self.reconnect_backoff_factor = factor;
        self
    }

    /// Set the reconnection jitter factor.
    #[must_use]
    pub fn reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter;
        self
    }

    /// Set the countdown tick period.
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the maximum pending requests.
    #[must_use]
    pub fn max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Set the control channel capacity.
    #[must_use]
    pub fn command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub(crate) fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.reconnect_interval,
            max_delay: self.reconnect_max_interval,
            factor: self.reconnect_backoff_factor,
            jitter: self.reconnect_jitter,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err("URL must use the ws:// or wss:// scheme".to_string());
        }
        self.backoff().validate()?;
        if self.tick_interval.is_zero() {
            return Err("Tick interval must be > 0".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.max_pending_requests == 0 {
            return Err("Max pending requests must be > 0".to_string());
        }
        if self.command_channel_capacity == 0 {
            return Err("Command channel capacity must be > 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err("Event channel capacity must be > 0".to_string());
        }
        Ok(())
    }
}
